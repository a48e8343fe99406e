//! A single droplet's lifecycle as an explicit, bounded state machine.

use super::brush::Brush;
use super::params::ErosionParams;
use crate::terrain::analysis::TerrainScale;
use crate::terrain::math::{in_interior, sample_gradient, sample_height};
use serde::{Deserialize, Serialize};

/// Zone factor = ZONE_FACTOR_BASE + ZONE_FACTOR_GAIN · P
pub const ZONE_FACTOR_BASE: f32 = 0.5;
pub const ZONE_FACTOR_GAIN: f32 = 1.0;

/// Erosion/deposition multiplier: 0.5 in scenic zones up to 1.5 where P = 1
#[inline]
pub fn zone_factor(potential: f32) -> f32 {
    ZONE_FACTOR_BASE + ZONE_FACTOR_GAIN * potential
}

/// Why a droplet stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Left the grid; its sediment leaves with it
    OutOfBounds,
    /// Slope fell below `min_slope` (local minimum)
    Stalled,
    /// Water dropped below `min_water`
    Evaporated,
    /// Hit `max_steps`
    StepCap,
}

/// Ephemeral droplet state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    /// Unit heading, (0, 0) until the first step
    pub vx: f32,
    pub vy: f32,
    /// Flow speed, gained from height drops along the path
    pub speed: f32,
    /// Carried sediment in meters
    pub sediment: f32,
    pub water: f32,
}

impl Particle {
    pub fn spawn(x: f32, y: f32, initial_speed: f32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            speed: initial_speed,
            sediment: 0.0,
            water: 1.0,
        }
    }

    /// Grid cell nearest to the particle, if it is still on the grid
    #[inline]
    fn cell(&self, n: usize) -> Option<(usize, usize)> {
        let cx = (self.x + 0.5).floor();
        let cy = (self.y + 0.5).floor();
        if cx >= 0.0 && cy >= 0.0 && (cx as usize) < n && (cy as usize) < n {
            Some((cx as usize, cy as usize))
        } else {
            None
        }
    }
}

/// Where a droplet reads heights from and writes its brush deltas to
pub trait HeightTarget {
    fn heights(&self) -> &[f32];
    /// Add `delta` (normalized height) under the brush centered on (cx, cy)
    fn apply(&mut self, brush: &Brush, cx: usize, cy: usize, delta: f32);
}

/// Writes straight into the field; used by the sequential driver
pub struct InPlace<'a> {
    pub data: &'a mut [f32],
    pub n: usize,
}

impl HeightTarget for InPlace<'_> {
    #[inline]
    fn heights(&self) -> &[f32] {
        &*self.data
    }

    #[inline]
    fn apply(&mut self, brush: &Brush, cx: usize, cy: usize, delta: f32) {
        let data = &mut *self.data;
        brush.for_each_cell(cx, cy, self.n, |idx, w| data[idx] += delta * w);
    }
}

/// Reads a frozen snapshot and records deltas; used by the batched driver
pub struct Recorded<'a> {
    pub snapshot: &'a [f32],
    pub n: usize,
    pub changes: Vec<(usize, f32)>,
}

impl HeightTarget for Recorded<'_> {
    #[inline]
    fn heights(&self) -> &[f32] {
        self.snapshot
    }

    #[inline]
    fn apply(&mut self, brush: &Brush, cx: usize, cy: usize, delta: f32) {
        let changes = &mut self.changes;
        brush.for_each_cell(cx, cy, self.n, |idx, w| changes.push((idx, delta * w)));
    }
}

/// What one droplet did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleOutcome {
    pub termination: Termination,
    pub steps: usize,
    /// Meters removed from the terrain
    pub eroded: f32,
    /// Meters added back, including the final settle
    pub deposited: f32,
}

/// Immutable context shared by every droplet of a run
pub struct Droplets<'a> {
    params: &'a ErosionParams,
    potential: &'a [f32],
    n: usize,
    brush: &'a Brush,
    grade_factor: f32,
    cell_size: f32,
    height_scale: f32,
}

impl<'a> Droplets<'a> {
    pub fn new(
        params: &'a ErosionParams,
        potential: &'a [f32],
        n: usize,
        brush: &'a Brush,
        scale: &TerrainScale,
    ) -> Self {
        Self {
            params,
            potential,
            n,
            brush,
            grade_factor: scale.grade_factor(),
            cell_size: scale.cell_size_meters,
            height_scale: scale.height_scale_meters,
        }
    }

    /// Fresh droplet at (x, y) with the configured starting speed
    pub fn spawn(&self, x: f32, y: f32) -> Particle {
        Particle::spawn(x, y, self.params.initial_speed)
    }

    /// Run one droplet to termination. Never exceeds `max_steps` iterations.
    pub fn run<T: HeightTarget>(&self, mut p: Particle, target: &mut T) -> ParticleOutcome {
        let params = self.params;
        let n = self.n;
        let mut outcome = ParticleOutcome {
            termination: Termination::StepCap,
            steps: 0,
            eroded: 0.0,
            deposited: 0.0,
        };

        for step in 0..params.max_steps {
            outcome.steps = step + 1;

            if !in_interior(p.x, p.y, n) {
                outcome.termination = Termination::OutOfBounds;
                return outcome;
            }

            let (gx, gy) = sample_gradient(target.heights(), n, p.x, p.y);
            let gx = gx * self.grade_factor;
            let gy = gy * self.grade_factor;
            let slope = (gx * gx + gy * gy).sqrt();

            if slope < params.min_slope {
                outcome.termination = Termination::Stalled;
                self.settle(&mut p, target, &mut outcome);
                return outcome;
            }

            // Gradient descent with momentum; the heading is kept unit length
            p.vx = params.inertia * p.vx - (1.0 - params.inertia) * gx;
            p.vy = params.inertia * p.vy - (1.0 - params.inertia) * gy;
            let len = (p.vx * p.vx + p.vy * p.vy).sqrt();
            if len.is_nan() || len <= 1e-9 {
                outcome.termination = Termination::Stalled;
                self.settle(&mut p, target, &mut outcome);
                return outcome;
            }
            p.vx /= len;
            p.vy /= len;

            let (nx, ny) = (p.x + p.vx, p.y + p.vy);
            if !in_interior(nx, ny, n) {
                outcome.termination = Termination::OutOfBounds;
                return outcome;
            }

            // Meters lost moving one cell along the heading; negative means uphill
            let old_height = sample_height(target.heights(), n, p.x, p.y) * self.height_scale;
            let new_height = sample_height(target.heights(), n, nx, ny) * self.height_scale;
            let drop = old_height - new_height;

            let grade = (drop / self.cell_size).max(params.min_slope);
            let capacity = params.sediment_capacity * grade * p.speed * p.water;

            if let Some((cx, cy)) = p.cell(n) {
                let factor = zone_factor(self.potential[cy * n + cx]);
                if drop < 0.0 || p.sediment > capacity {
                    let amount = if drop < 0.0 {
                        // Uphill: fill the pit behind, at most up to the rim
                        (-drop).min(p.sediment)
                    } else {
                        ((p.sediment - capacity) * params.deposition_rate * factor).min(p.sediment)
                    };
                    target.apply(self.brush, cx, cy, amount / self.height_scale);
                    p.sediment -= amount;
                    outcome.deposited += amount;
                } else {
                    // Never dig below the cell the droplet is heading into
                    let amount = ((capacity - p.sediment) * params.erosion_rate * factor).min(drop);
                    target.apply(self.brush, cx, cy, -amount / self.height_scale);
                    p.sediment += amount;
                    outcome.eroded += amount;
                }
            }

            p.speed = (p.speed * p.speed + drop * params.gravity).max(0.0).sqrt();
            p.x = nx;
            p.y = ny;
            p.water *= 1.0 - params.evaporation_rate;

            if p.water < params.min_water {
                outcome.termination = Termination::Evaporated;
                self.settle(&mut p, target, &mut outcome);
                return outcome;
            }
        }

        self.settle(&mut p, target, &mut outcome);
        outcome
    }

    /// Drop everything still carried at the droplet's current cell
    fn settle<T: HeightTarget>(&self, p: &mut Particle, target: &mut T, outcome: &mut ParticleOutcome) {
        if p.sediment <= 0.0 {
            return;
        }
        if let Some((cx, cy)) = p.cell(self.n) {
            target.apply(self.brush, cx, cy, p.sediment / self.height_scale);
            outcome.deposited += p.sediment;
            p.sediment = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> TerrainScale {
        // 10 m cells, 100 m vertical: 0.01 per cell is a 10 % grade
        TerrainScale {
            cell_size_meters: 10.0,
            height_scale_meters: 100.0,
        }
    }

    fn tilted(n: usize) -> Vec<f32> {
        (0..n * n).map(|i| 0.9 - 0.01 * (i % n) as f32).collect()
    }

    #[test]
    fn test_zone_factor_range() {
        assert_eq!(zone_factor(0.0), 0.5);
        assert_eq!(zone_factor(1.0), 1.5);
    }

    #[test]
    fn test_flat_ground_stalls_immediately() {
        let n = 32;
        let params = ErosionParams::default();
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.5; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        let mut data = vec![0.5; n * n];
        let outcome = droplets.run(droplets.spawn(10.0, 10.0), &mut InPlace { data: &mut data, n });

        assert_eq!(outcome.termination, Termination::Stalled);
        assert_eq!(outcome.steps, 1);
        assert!(data.iter().all(|&h| h == 0.5));
    }

    #[test]
    fn test_droplet_runs_downhill_and_erodes() {
        let n = 64;
        let params = ErosionParams::default();
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.0; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        let mut data = tilted(n);
        let start = droplets.spawn(5.0, 32.0);
        let outcome = droplets.run(start, &mut InPlace { data: &mut data, n });

        // Heights fall with x, so the droplet exits on the right edge
        assert_eq!(outcome.termination, Termination::OutOfBounds);
        assert!(outcome.eroded > 0.0);
        assert!(outcome.deposited <= outcome.eroded + 1e-4);
    }

    #[test]
    fn test_step_cap_bounds_lifecycle() {
        let n = 64;
        let params = ErosionParams {
            max_steps: 3,
            ..ErosionParams::default()
        };
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.0; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        let mut data = tilted(n);
        let outcome = droplets.run(droplets.spawn(5.0, 32.0), &mut InPlace { data: &mut data, n });
        assert_eq!(outcome.termination, Termination::StepCap);
        assert_eq!(outcome.steps, 3);
        // Whatever was picked up is put back on the final cell
        assert!((outcome.deposited - outcome.eroded).abs() < 1e-4);
    }

    #[test]
    fn test_evaporation_ends_droplet() {
        let n = 256;
        let params = ErosionParams {
            evaporation_rate: 0.5,
            ..ErosionParams::default()
        };
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.0; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        let mut data: Vec<f32> = (0..n * n).map(|i| 0.9 - 0.002 * (i % n) as f32).collect();
        let outcome = droplets.run(droplets.spawn(5.0, 100.0), &mut InPlace { data: &mut data, n });
        assert_eq!(outcome.termination, Termination::Evaporated);
        // 0.5^7 < 0.01
        assert_eq!(outcome.steps, 7);
    }

    #[test]
    fn test_recorded_target_leaves_snapshot_intact() {
        let n = 64;
        let params = ErosionParams::default();
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.0; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        let snapshot = tilted(n);
        let mut recorded = Recorded {
            snapshot: &snapshot,
            n,
            changes: Vec::new(),
        };
        let outcome = droplets.run(droplets.spawn(5.0, 32.0), &mut recorded);

        assert!(outcome.eroded > 0.0);
        assert!(!recorded.changes.is_empty());
        assert_eq!(snapshot, tilted(n));
    }

    #[test]
    fn test_buildable_zone_erodes_harder() {
        let n = 64;
        let params = ErosionParams::default();
        let brush = Brush::gaussian(params.brush_radius);

        let run = |p: f32| {
            let potential = vec![p; n * n];
            let droplets = Droplets::new(&params, &potential, n, &brush, &scale());
            let mut data = tilted(n);
            let outcome = droplets.run(droplets.spawn(5.0, 32.0), &mut InPlace { data: &mut data, n });
            outcome.eroded
        };

        assert!(run(1.0) > run(0.0));
    }

    #[test]
    fn test_gentle_grade_keeps_droplet_moving() {
        // 2 % grade: buildable-looking ground must still be worked on
        let n = 256;
        let params = ErosionParams::default();
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.0; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        let mut data: Vec<f32> = (0..n * n).map(|i| 0.9 - 0.002 * (i % n) as f32).collect();
        let outcome = droplets.run(droplets.spawn(5.0, 128.0), &mut InPlace { data: &mut data, n });

        println!("gentle grade: {:?}", outcome);
        assert_eq!(outcome.termination, Termination::OutOfBounds);
        assert!(outcome.steps > 200);
        assert!(outcome.eroded > 1.0, "only {:.4} m eroded", outcome.eroded);
    }

    #[test]
    fn test_uphill_move_fills_behind_without_eroding() {
        let n = 64;
        let params = ErosionParams {
            inertia: 0.99,
            max_steps: 5,
            ..ErosionParams::default()
        };
        let brush = Brush::gaussian(params.brush_radius);
        let potential = vec![0.0; n * n];
        let droplets = Droplets::new(&params, &potential, n, &brush, &scale());

        // Rising 1 m per cell; momentum carries the droplet up it
        let mut data: Vec<f32> = (0..n * n).map(|i| 0.2 + 0.01 * (i % n) as f32).collect();
        let before = data[32 * n + 20];
        let p = Particle {
            vx: 1.0,
            sediment: 0.5,
            ..droplets.spawn(20.0, 32.0)
        };
        let outcome = droplets.run(p, &mut InPlace { data: &mut data, n });

        assert_eq!(outcome.termination, Termination::StepCap);
        assert_eq!(outcome.eroded, 0.0);
        assert!((outcome.deposited - 0.5).abs() < 1e-6);
        assert!(data[32 * n + 20] > before);
    }
}
