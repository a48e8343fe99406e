// 水力侵蚀（粒子模拟）
//
// Droplets run down the terrain and pick up speed from every meter they drop.
// They carry sediment off fast, steep stretches, drop it where they slow down
// and use it to fill the pits they climb out of. Strength follows the
// buildability potential: up to 1.5x where P = 1 (net flattening), 0.5x in
// scenic zones (relief survives).

mod brush;
mod params;
mod particle;

pub use brush::Brush;
pub use params::{ErosionMode, ErosionParams};
pub use particle::{
    zone_factor, Droplets, HeightTarget, InPlace, Particle, ParticleOutcome, Recorded, Termination,
};

use super::analysis::TerrainScale;
use super::error::{GenerationError, Result, Stage};
use super::grid::{BuildabilityPotential, HeightField};
use super::math::stage_seed;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Seed offset of the droplet spawn stream
pub const EROSION_SEED_OFFSET: u64 = 3;

/// Sequential driver clamps the field to [0, 1] this often, in particles
pub const CLAMP_INTERVAL: usize = 1024;

/// Particles between two looks at the cancel flag
const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TerminationCounts {
    pub out_of_bounds: usize,
    pub stalled: usize,
    pub evaporated: usize,
    pub step_cap: usize,
}

impl TerminationCounts {
    fn record(&mut self, termination: Termination) {
        match termination {
            Termination::OutOfBounds => self.out_of_bounds += 1,
            Termination::Stalled => self.stalled += 1,
            Termination::Evaporated => self.evaporated += 1,
            Termination::StepCap => self.step_cap += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErosionStats {
    pub particles: usize,
    pub total_steps: u64,
    /// Meters of material picked up
    pub total_eroded: f64,
    /// Meters of material put back down
    pub total_deposited: f64,
    pub terminations: TerminationCounts,
}

impl ErosionStats {
    fn record(&mut self, outcome: &ParticleOutcome) {
        self.particles += 1;
        self.total_steps += outcome.steps as u64;
        self.total_eroded += outcome.eroded as f64;
        self.total_deposited += outcome.deposited as f64;
        self.terminations.record(outcome.termination);
    }

    pub fn mean_steps(&self) -> f64 {
        if self.particles == 0 {
            0.0
        } else {
            self.total_steps as f64 / self.particles as f64
        }
    }
}

/// Particle-based hydraulic erosion over a height field
pub struct HydraulicErosion {
    params: ErosionParams,
    scale: TerrainScale,
    cancel: Option<Arc<AtomicBool>>,
}

impl HydraulicErosion {
    pub fn new(params: ErosionParams, scale: TerrainScale) -> Self {
        Self {
            params,
            scale,
            cancel: None,
        }
    }

    /// Honor an external cancel request between particles
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Erode `terrain` in place and hand it back with run statistics.
    ///
    /// The particle budget is not range-checked here; the pipeline does that
    /// before any stage runs.
    pub fn erode(
        &self,
        mut terrain: HeightField,
        potential: &BuildabilityPotential,
        seed: u64,
    ) -> Result<(HeightField, ErosionStats)> {
        self.params.validate_physics()?;
        potential.ensure_matches(&terrain)?;

        let n = terrain.resolution();
        let brush = Brush::gaussian(self.params.brush_radius);
        let spawns = spawn_positions(n, self.params.num_particles, stage_seed(seed, EROSION_SEED_OFFSET));
        let droplets = Droplets::new(&self.params, potential.data(), n, &brush, &self.scale);

        let stats = match self.params.mode {
            ErosionMode::Sequential => self.run_sequential(&mut terrain, &droplets, &spawns)?,
            ErosionMode::Batched { batch_size } => {
                self.run_batched(&mut terrain, &droplets, &spawns, batch_size)?
            }
        };

        terrain.clamp_unit();

        log::debug!(
            "erosion: {} particles, {:.1} mean steps, eroded {:.1} m, deposited {:.1} m, {:?}",
            stats.particles,
            stats.mean_steps(),
            stats.total_eroded,
            stats.total_deposited,
            stats.terminations
        );

        Ok((terrain, stats))
    }

    fn run_sequential(
        &self,
        terrain: &mut HeightField,
        droplets: &Droplets<'_>,
        spawns: &[(f32, f32)],
    ) -> Result<ErosionStats> {
        let n = terrain.resolution();
        let mut stats = ErosionStats::default();

        for (i, &(x, y)) in spawns.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && self.cancelled() {
                return Err(GenerationError::Cancelled { stage: Stage::Erosion });
            }

            let mut target = InPlace {
                data: terrain.data_mut(),
                n,
            };
            let outcome = droplets.run(droplets.spawn(x, y), &mut target);
            stats.record(&outcome);

            // Bound float drift by clamping, never by renormalizing
            if (i + 1) % CLAMP_INTERVAL == 0 {
                terrain.clamp_unit();
            }
        }

        Ok(stats)
    }

    fn run_batched(
        &self,
        terrain: &mut HeightField,
        droplets: &Droplets<'_>,
        spawns: &[(f32, f32)],
        batch_size: usize,
    ) -> Result<ErosionStats> {
        let n = terrain.resolution();
        let mut stats = ErosionStats::default();

        for batch in spawns.chunks(batch_size.max(1)) {
            if self.cancelled() {
                return Err(GenerationError::Cancelled { stage: Stage::Erosion });
            }

            let snapshot = terrain.data().to_vec();
            // collect() keeps particle order, so the reduction below is
            // independent of thread scheduling
            let results: Vec<(ParticleOutcome, Vec<(usize, f32)>)> = batch
                .par_iter()
                .map(|&(x, y)| {
                    let mut target = Recorded {
                        snapshot: &snapshot,
                        n,
                        changes: Vec::new(),
                    };
                    let outcome = droplets.run(droplets.spawn(x, y), &mut target);
                    (outcome, target.changes)
                })
                .collect();

            let data = terrain.data_mut();
            for (outcome, changes) in &results {
                stats.record(outcome);
                for &(idx, delta) in changes {
                    data[idx] += delta;
                }
            }

            terrain.clamp_unit();
        }

        Ok(stats)
    }
}

/// Uniform spawn points over the interior, drawn from one seeded stream
pub fn spawn_positions(n: usize, count: usize, seed: u64) -> Vec<(f32, f32)> {
    let limit = n.saturating_sub(1) as f32;
    if limit <= 0.0 {
        return Vec::new();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (rng.random_range(0.0..limit), rng.random_range(0.0..limit)))
        .collect()
}

/// Erode `terrain` with droplets spawned from `seed`
pub fn erode(
    terrain: HeightField,
    potential: &BuildabilityPotential,
    params: &ErosionParams,
    scale: &TerrainScale,
    seed: u64,
) -> Result<(HeightField, ErosionStats)> {
    HydraulicErosion::new(*params, *scale).erode(terrain, potential, seed)
}
