use crate::terrain::error::{check_positive, check_range, Result};
use serde::{Deserialize, Serialize};

/// How droplets are scheduled against the shared height field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErosionMode {
    /// One full particle lifecycle at a time, mutating the field in place
    #[default]
    Sequential,
    /// Particles of a batch run in parallel against a snapshot; their deltas
    /// are summed in particle order afterwards. Deterministic for a fixed
    /// seed, but not identical to `Sequential`.
    Batched { batch_size: usize },
}

/// Droplet erosion parameters.
///
/// Heights inside the simulation are meters and slopes are grades (rise/run),
/// so these values do not depend on grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErosionParams {
    /// Number of droplets, [50 000, 200 000]
    pub num_particles: usize,
    /// Share of the previous velocity kept each step, [0, 1)
    pub inertia: f32,
    /// Fraction of free capacity picked up per step, (0, 1]
    pub erosion_rate: f32,
    /// Fraction of excess sediment dropped per step, (0, 1]
    pub deposition_rate: f32,
    /// Water lost per step, (0, 1)
    pub evaporation_rate: f32,
    /// Capacity multiplier (meters per unit of grade · speed · water)
    pub sediment_capacity: f32,
    /// Grade below which a droplet is considered stuck; also the floor of
    /// the grade used for capacity
    pub min_slope: f32,
    /// Speed gained per meter of drop: `speed² += drop · gravity`
    pub gravity: f32,
    /// Speed of a freshly spawned droplet
    pub initial_speed: f32,
    /// Gaussian brush radius in cells, [3, 5]
    pub brush_radius: usize,
    /// Hard cap on steps per droplet
    pub max_steps: usize,
    /// Water volume below which a droplet has evaporated, (0, 1)
    pub min_water: f32,
    pub mode: ErosionMode,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            num_particles: 100_000,
            inertia: 0.3,
            erosion_rate: 0.3,
            deposition_rate: 0.3,
            evaporation_rate: 0.01,
            sediment_capacity: 64.0,
            min_slope: 0.001,
            gravity: 4.0,
            initial_speed: 1.0,
            brush_radius: 3,
            max_steps: 1000,
            min_water: 0.01,
            mode: ErosionMode::Sequential,
        }
    }
}

impl ErosionParams {
    /// Full validation, including the documented particle budget
    pub fn validate(&self) -> Result<()> {
        check_range(
            "erosion.num_particles",
            self.num_particles,
            50_000,
            200_000,
            "[50000, 200000] particles",
        )?;
        self.validate_physics()
    }

    /// Everything but the particle budget; enough for the simulation to be sound
    pub fn validate_physics(&self) -> Result<()> {
        check_range("erosion.inertia", self.inertia, 0.0, 0.999, "[0, 1)")?;
        check_range("erosion.erosion_rate", self.erosion_rate, f32::MIN_POSITIVE, 1.0, "(0, 1]")?;
        check_range("erosion.deposition_rate", self.deposition_rate, f32::MIN_POSITIVE, 1.0, "(0, 1]")?;
        check_range("erosion.evaporation_rate", self.evaporation_rate, f32::MIN_POSITIVE, 0.999, "(0, 1)")?;
        check_positive("erosion.sediment_capacity", self.sediment_capacity)?;
        check_range("erosion.min_slope", self.min_slope, 0.0, f32::MAX, "a finite grade >= 0")?;
        check_positive("erosion.gravity", self.gravity)?;
        check_range("erosion.initial_speed", self.initial_speed, 0.0, f32::MAX, "a finite speed >= 0")?;
        check_range("erosion.brush_radius", self.brush_radius, 3, 5, "3..=5 cells")?;
        check_range("erosion.max_steps", self.max_steps, 1, 100_000, "1..=100000")?;
        check_range("erosion.min_water", self.min_water, f32::MIN_POSITIVE, 0.999, "(0, 1)")?;
        if let ErosionMode::Batched { batch_size } = self.mode {
            check_range("erosion.batch_size", batch_size, 1, usize::MAX, "at least 1")?;
        }
        Ok(())
    }
}
