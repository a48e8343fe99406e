//! Buildability zones.
//!
//! A low-octave, long-wavelength FBM field read as a continuous potential P:
//! near 1 the terrain should end up flat and developable, near 0 it stays
//! mountainous. Coverage is measured at the 0.5 cut and reported, never forced.
//!
//! The normalized field is re-centered so its median sits at P = 0.5, which
//! puts the cut at about half the map whatever the seed. The stretch is the
//! same on both sides of the median, so this never steepens the field.

use super::analysis::{distinct_levels, fraction_between, gradient_stats};
use super::error::{check_range, GenerationError, Result};
use super::grid::{BuildabilityPotential, Grid};
use super::math::stage_seed;
use super::noise::{generate_noise_field, NoiseConfig};
use serde::{Deserialize, Serialize};

/// Seed offset of the zone noise stream
pub const ZONE_SEED_OFFSET: u64 = 0;

/// Upper bound on the mean per-cell gradient of P; rougher fields mean the
/// wavelength/octaves are mis-tuned for the map
pub const MAX_MEAN_ZONE_GRADIENT: f32 = 0.05;

/// Quantization used when counting distinct potential levels
pub const POTENTIAL_QUANTIZATION: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneParams {
    /// Requested buildable fraction, a soft target in [0.6, 0.8]
    pub target_coverage: f32,
    /// Base wavelength in meters, [5000, 8000]
    pub wavelength_meters: f32,
    /// 2 or 3; more octaves break zones into speckle
    pub octaves: usize,
    /// Amplitude decay between octaves, (0, 1]
    pub persistence: f32,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            target_coverage: 0.70,
            wavelength_meters: 6500.0,
            octaves: 2,
            persistence: 0.5,
        }
    }
}

impl ZoneParams {
    pub fn validate(&self) -> Result<()> {
        check_range("zones.target_coverage", self.target_coverage, 0.6, 0.8, "[0.6, 0.8]")?;
        check_range("zones.wavelength_meters", self.wavelength_meters, 5000.0, 8000.0, "[5000, 8000] m")?;
        check_range("zones.octaves", self.octaves, 2, 3, "2 or 3")?;
        check_range("zones.persistence", self.persistence, f32::MIN_POSITIVE, 1.0, "(0, 1]")?;
        Ok(())
    }

    fn noise_config(&self, seed: u64) -> NoiseConfig {
        NoiseConfig {
            seed: stage_seed(seed, ZONE_SEED_OFFSET),
            wavelength_meters: self.wavelength_meters,
            octaves: self.octaves,
            persistence: self.persistence,
            lacunarity: 2.0,
        }
    }
}

/// What the zone stage measured about its own output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneStats {
    /// 100 · count(P > 0.5) / N²
    pub coverage_percent: f32,
    /// Requested coverage, as a percentage
    pub target_coverage_percent: f32,
    /// coverage − target, in percentage points
    pub coverage_discrepancy: f32,
    pub mean_gradient: f32,
    pub max_gradient: f32,
    pub distinct_levels: usize,
    /// Fraction of cells with 0.1 < P < 0.9
    pub continuous_fraction: f32,
}

/// Produces the buildability potential field
pub struct ZoneGenerator {
    params: ZoneParams,
}

impl ZoneGenerator {
    pub fn new(params: ZoneParams) -> Self {
        Self { params }
    }

    pub fn generate(
        &self,
        resolution: usize,
        map_size_meters: f32,
        seed: u64,
    ) -> Result<(BuildabilityPotential, ZoneStats)> {
        self.params.validate()?;

        let mut grid = generate_noise_field(&self.params.noise_config(seed), resolution, map_size_meters)?;
        center_on_median(&mut grid);

        let (mean_gradient, max_gradient) = gradient_stats(&grid);
        if mean_gradient > MAX_MEAN_ZONE_GRADIENT {
            return Err(GenerationError::ZoneGradientTooHigh {
                mean_gradient,
                bound: MAX_MEAN_ZONE_GRADIENT,
            });
        }

        let potential = BuildabilityPotential::from_grid(grid);
        let coverage_percent = potential.coverage_percent(0.5);
        let target_coverage_percent = self.params.target_coverage * 100.0;

        let stats = ZoneStats {
            coverage_percent,
            target_coverage_percent,
            coverage_discrepancy: coverage_percent - target_coverage_percent,
            mean_gradient,
            max_gradient,
            distinct_levels: distinct_levels(potential.data(), POTENTIAL_QUANTIZATION),
            continuous_fraction: fraction_between(potential.data(), 0.1, 0.9),
        };

        log::debug!(
            "zones: {} levels, {:.1}% continuous, mean gradient {:.5}, max {:.5}",
            stats.distinct_levels,
            stats.continuous_fraction * 100.0,
            mean_gradient,
            max_gradient
        );

        Ok((potential, stats))
    }
}

/// Affine map sending the median to 0.5 with one slope for both halves, so
/// the farther extreme lands on 0 or 1 and the nearer one stays inside
fn center_on_median(grid: &mut Grid) {
    if grid.is_empty() {
        return;
    }
    let (lo, hi) = grid.min_max();
    let mut sorted = grid.data().to_vec();
    let mid = sorted.len() / 2;
    let (_, &mut median, _) = sorted.select_nth_unstable_by(mid, f32::total_cmp);

    let half = (hi - median).max(median - lo);
    if half <= f32::EPSILON {
        return;
    }
    let gain = 0.5 / half;
    for v in grid.data_mut() {
        *v = (0.5 + (*v - median) * gain).clamp(0.0, 1.0);
    }
}

/// Generate the buildability potential for an N×N map
pub fn generate_zones(
    resolution: usize,
    map_size_meters: f32,
    seed: u64,
    params: &ZoneParams,
) -> Result<(BuildabilityPotential, ZoneStats)> {
    ZoneGenerator::new(*params).generate(resolution, map_size_meters, seed)
}
