//! Ridge enhancement for scenic zones.
//!
//! Folding FBM around its midline, `R = 2·|0.5 − fbm|`, turns smooth hills into
//! V-shaped creases that read as ridgelines. The result is blended in only
//! where the potential is low, behind a smoothstep so the transition band
//! has no visible edge. Runs before erosion so droplets carve into the ridges.

use super::error::{check_positive, check_range, GenerationError, Result};
use super::grid::{BuildabilityPotential, Grid, HeightField};
use super::math::{smoothstep, stage_seed};
use super::noise::{generate_noise_field, NoiseConfig, MAX_OCTAVES};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Seed offset of the ridge noise stream
pub const RIDGE_SEED_OFFSET: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RidgeParams {
    /// Ridge noise octaves (≈5)
    pub octaves: usize,
    /// Height added at full ridge, [0.1, 0.3]
    pub strength: f32,
    /// Potential above which cells are untouched (≈0.4 is edge1; see `blend_factor`)
    pub blend_edge0: f32,
    pub blend_edge1: f32,
    /// Base wavelength of the ridge noise in meters
    pub wavelength_meters: f32,
    pub persistence: f32,
    pub lacunarity: f32,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self {
            octaves: 5,
            strength: 0.2,
            blend_edge0: 0.2,
            blend_edge1: 0.4,
            wavelength_meters: 2500.0,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

impl RidgeParams {
    pub fn validate(&self) -> Result<()> {
        check_range("ridges.octaves", self.octaves, 1, MAX_OCTAVES, "an octave count in 1..=32")?;
        check_range("ridges.strength", self.strength, 0.1, 0.3, "[0.1, 0.3]")?;
        check_range("ridges.blend_edge0", self.blend_edge0, 0.0, 1.0, "[0, 1]")?;
        check_range("ridges.blend_edge1", self.blend_edge1, 0.0, 1.0, "[0, 1]")?;
        if self.blend_edge0 >= self.blend_edge1 {
            return Err(GenerationError::invalid(
                "ridges.blend_edge0",
                self.blend_edge0,
                "less than blend_edge1",
            ));
        }
        check_positive("ridges.wavelength_meters", self.wavelength_meters)?;
        check_range("ridges.persistence", self.persistence, f32::MIN_POSITIVE, 1.0, "(0, 1]")?;
        check_positive("ridges.lacunarity", self.lacunarity)?;
        Ok(())
    }

    /// Ridge weight α for a potential value: 1 below `blend_edge0`, 0 above
    /// `blend_edge1`, Hermite in between.
    #[inline]
    pub fn blend_factor(&self, potential: f32) -> f32 {
        1.0 - smoothstep(self.blend_edge0, self.blend_edge1, potential)
    }

    fn noise_config(&self, seed: u64) -> NoiseConfig {
        NoiseConfig {
            seed: stage_seed(seed, RIDGE_SEED_OFFSET),
            wavelength_meters: self.wavelength_meters,
            octaves: self.octaves,
            persistence: self.persistence,
            lacunarity: self.lacunarity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RidgeStats {
    /// Cells with α > 0
    pub blended_cells: usize,
    /// Cells with α = 1
    pub full_ridge_cells: usize,
    /// Mean height added over blended cells
    pub mean_added: f32,
}

pub struct RidgeEnhancer {
    params: RidgeParams,
}

impl RidgeEnhancer {
    pub fn new(params: RidgeParams) -> Self {
        Self { params }
    }

    /// R(x, y) = 2·|0.5 − fbm(x, y)| in [0, 1]
    pub fn ridge_field(&self, resolution: usize, map_size_meters: f32, seed: u64) -> Result<Grid> {
        let mut grid = generate_noise_field(&self.params.noise_config(seed), resolution, map_size_meters)?;
        grid.data_mut()
            .par_iter_mut()
            .for_each(|v| *v = 2.0 * (0.5 - *v).abs());
        Ok(grid)
    }

    pub fn enhance(
        &self,
        mut terrain: HeightField,
        potential: &BuildabilityPotential,
        map_size_meters: f32,
        seed: u64,
    ) -> Result<(HeightField, RidgeStats)> {
        self.params.validate()?;
        potential.ensure_matches(&terrain)?;

        let ridges = self.ridge_field(terrain.resolution(), map_size_meters, seed)?;
        let params = self.params;

        let n = terrain.resolution();
        // Per-row partials, summed in row order so the f64 total does not
        // depend on how rayon splits the work
        let rows: Vec<(usize, usize, f64)> = terrain
            .data_mut()
            .par_chunks_mut(n.max(1))
            .zip(potential.data().par_chunks(n.max(1)))
            .zip(ridges.data().par_chunks(n.max(1)))
            .map(|((heights, ps), rs)| {
                let mut row = (0usize, 0usize, 0.0f64);
                for ((h, &p), &r) in heights.iter_mut().zip(ps).zip(rs) {
                    let alpha = params.blend_factor(p);
                    if alpha <= 0.0 {
                        continue;
                    }
                    let before = *h;
                    *h = (before + alpha * r * params.strength).clamp(0.0, 1.0);
                    row.0 += 1;
                    row.1 += (alpha >= 1.0) as usize;
                    row.2 += (*h - before) as f64;
                }
                row
            })
            .collect();
        let (blended_cells, full_ridge_cells, added) = rows
            .iter()
            .fold((0, 0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

        let stats = RidgeStats {
            blended_cells,
            full_ridge_cells,
            mean_added: if blended_cells > 0 {
                (added / blended_cells as f64) as f32
            } else {
                0.0
            },
        };

        log::debug!(
            "ridges: blended {} cells ({} full), mean added {:.4}",
            stats.blended_cells,
            stats.full_ridge_cells,
            stats.mean_added
        );

        Ok((terrain, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::analysis::mean_local_variance;

    const MAP: f32 = 14_336.0;

    fn split_potential(n: usize) -> BuildabilityPotential {
        // Left third scenic, middle transition, right third buildable
        BuildabilityPotential::from_fn(n, |x, _| {
            if x < n / 3 {
                0.1
            } else if x < 2 * n / 3 {
                0.3
            } else {
                0.8
            }
        })
    }

    #[test]
    fn test_blend_factor_edges() {
        let params = RidgeParams::default();
        assert_eq!(params.blend_factor(0.1), 1.0);
        assert_eq!(params.blend_factor(0.5), 0.0);
        assert!((params.blend_factor(0.3) - 0.5).abs() < 1e-6);
        // Monotone across the band
        let mut previous = 1.0;
        for i in 0..=100 {
            let a = params.blend_factor(i as f32 / 100.0);
            assert!(a <= previous);
            previous = a;
        }
    }

    #[test]
    fn test_ridge_field_range() {
        let enhancer = RidgeEnhancer::new(RidgeParams::default());
        let ridges = enhancer.ridge_field(64, MAP, 1).unwrap();
        assert!(ridges.data().iter().all(|r| (0.0..=1.0).contains(r)));
        // The fold puts the midline at zero and both extremes at one
        let (lo, hi) = ridges.min_max();
        assert!(lo < 0.05);
        assert!(hi > 0.95);
    }

    #[test]
    fn test_buildable_cells_untouched() {
        let n = 96;
        let terrain = HeightField::from_fn(n, |x, y| 0.2 + 0.001 * ((x * 7 + y * 3) % 50) as f32);
        let potential = split_potential(n);
        let enhancer = RidgeEnhancer::new(RidgeParams::default());

        let (enhanced, stats) = enhancer.enhance(terrain.clone(), &potential, MAP, 11).unwrap();

        for y in 0..n {
            for x in 0..n {
                if potential.get(x, y) > 0.4 {
                    assert_eq!(enhanced.get(x, y), terrain.get(x, y), "changed at ({}, {})", x, y);
                }
            }
        }
        assert_eq!(stats.blended_cells, (2 * n / 3) * n);
        assert_eq!(stats.full_ridge_cells, (n / 3) * n);
    }

    #[test]
    fn test_scenic_cells_gain_variance() {
        let n = 96;
        let terrain = HeightField::filled(n, 0.3);
        let potential = split_potential(n);
        let enhancer = RidgeEnhancer::new(RidgeParams::default());

        let scenic = |x: usize, y: usize| potential.get(x, y) < 0.2;
        let before = mean_local_variance(terrain.grid(), 2, scenic);
        let (enhanced, _) = enhancer.enhance(terrain, &potential, MAP, 11).unwrap();
        let after = mean_local_variance(enhanced.grid(), 2, scenic);

        assert!(after > before + 1e-5, "variance before {} after {}", before, after);
    }

    #[test]
    fn test_result_stays_in_unit_range() {
        let n = 64;
        let terrain = HeightField::filled(n, 0.95);
        let potential = BuildabilityPotential::from_fn(n, |_, _| 0.0);
        let enhancer = RidgeEnhancer::new(RidgeParams { strength: 0.3, ..RidgeParams::default() });
        let (enhanced, _) = enhancer.enhance(terrain, &potential, MAP, 2).unwrap();
        assert!(enhanced.data().iter().all(|h| (0.0..=1.0).contains(h)));
    }

    #[test]
    fn test_stats_independent_of_thread_count() {
        let n = 128;
        let terrain = HeightField::from_fn(n, |x, y| 0.2 + 0.001 * ((x * 7 + y * 3) % 50) as f32);
        let potential = BuildabilityPotential::from_fn(n, |x, _| x as f32 / (n - 1) as f32);
        let enhancer = RidgeEnhancer::new(RidgeParams::default());

        let run_with = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| enhancer.enhance(terrain.clone(), &potential, MAP, 5).unwrap())
        };
        let (field_1, stats_1) = run_with(1);
        for threads in [2, 3, 8] {
            let (field, stats) = run_with(threads);
            assert_eq!(field, field_1);
            assert_eq!(stats.mean_added.to_bits(), stats_1.mean_added.to_bits(), "{} threads", threads);
            assert_eq!(stats.blended_cells, stats_1.blended_cells);
        }
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let enhancer = RidgeEnhancer::new(RidgeParams::default());
        let result = enhancer.enhance(HeightField::new(32), &split_potential(64), MAP, 1);
        assert!(matches!(result, Err(GenerationError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_parameter_ranges() {
        let ok = RidgeParams::default();
        assert!(ok.validate().is_ok());
        assert!(RidgeParams { strength: 0.5, ..ok }.validate().is_err());
        assert!(RidgeParams { blend_edge0: 0.5, ..ok }.validate().is_err());
        assert!(RidgeParams { octaves: 0, ..ok }.validate().is_err());
    }
}
