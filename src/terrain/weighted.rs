//! Zone-weighted base terrain.
//!
//! One noise field with the same octaves and wavelength everywhere; only its
//! amplitude follows the buildability potential. Switching octave counts per
//! zone would multiply fields with disjoint spectra and leave seams along
//! zone boundaries.

use super::error::{check_positive, check_range, Result};
use super::grid::{BuildabilityPotential, Grid, HeightField};
use super::math::stage_seed;
use super::noise::{generate_noise_field, normalize_min_max, NoiseConfig, MAX_OCTAVES};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Seed offset of the base terrain noise stream
pub const TERRAIN_SEED_OFFSET: u64 = 1;

/// Raw range inside which the field is clamped rather than stretched
pub const SMART_NORMALIZE_RANGE: (f32, f32) = (-0.1, 1.1);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainParams {
    /// Peak amplitude of the base noise, (0, 1]
    pub base_amplitude: f32,
    /// Amplitude multiplier where P = 1, [0.2, 0.4]
    pub min_mult: f32,
    /// Amplitude multiplier where P = 0, [0.8, 1.2]
    pub max_mult: f32,
    /// Base wavelength in meters
    pub wavelength_meters: f32,
    /// Octave count, same at every cell (≈6)
    pub octaves: usize,
    pub persistence: f32,
    pub lacunarity: f32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            base_amplitude: 0.15,
            min_mult: 0.3,
            max_mult: 1.0,
            wavelength_meters: 3000.0,
            octaves: 6,
            persistence: 0.55,
            lacunarity: 2.0,
        }
    }
}

impl TerrainParams {
    pub fn validate(&self) -> Result<()> {
        check_range("terrain.base_amplitude", self.base_amplitude, f32::MIN_POSITIVE, 1.0, "(0, 1]")?;
        check_range("terrain.min_mult", self.min_mult, 0.2, 0.4, "[0.2, 0.4]")?;
        check_range("terrain.max_mult", self.max_mult, 0.8, 1.2, "[0.8, 1.2]")?;
        check_positive("terrain.wavelength_meters", self.wavelength_meters)?;
        check_range("terrain.octaves", self.octaves, 1, MAX_OCTAVES, "an octave count in 1..=32")?;
        check_range("terrain.persistence", self.persistence, f32::MIN_POSITIVE, 1.0, "(0, 1]")?;
        check_positive("terrain.lacunarity", self.lacunarity)?;
        Ok(())
    }

    /// amplitude(P) = base · (min + (max − min) · (1 − P)); non-increasing in P
    #[inline]
    pub fn amplitude(&self, potential: f32) -> f32 {
        self.base_amplitude * (self.min_mult + (self.max_mult - self.min_mult) * (1.0 - potential))
    }

    fn noise_config(&self, seed: u64) -> NoiseConfig {
        NoiseConfig {
            seed: stage_seed(seed, TERRAIN_SEED_OFFSET),
            wavelength_meters: self.wavelength_meters,
            octaves: self.octaves,
            persistence: self.persistence,
            lacunarity: self.lacunarity,
        }
    }
}

/// How the modulated field was brought into [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormalizationMode {
    /// Raw range already near [0, 1]; clamped without rescaling
    #[default]
    Clamped,
    /// Raw range too wide; min-max stretched
    Stretched,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightedStats {
    pub raw_min: f32,
    pub raw_max: f32,
    pub normalization: NormalizationMode,
}

/// Clamp if the range already lies within [-0.1, 1.1], stretch otherwise.
///
/// Stretching a field that is already nearly in range would amplify its
/// gradients everywhere.
pub fn smart_normalize(data: &mut [f32]) -> NormalizationMode {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (low_bound, high_bound) = SMART_NORMALIZE_RANGE;

    if lo >= low_bound && hi <= high_bound {
        data.par_iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
        NormalizationMode::Clamped
    } else {
        normalize_min_max(data);
        NormalizationMode::Stretched
    }
}

pub struct WeightedTerrainGenerator {
    params: TerrainParams,
}

impl WeightedTerrainGenerator {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    /// Per-cell amplitude implied by the potential
    pub fn amplitude_field(&self, potential: &BuildabilityPotential) -> Grid {
        let params = self.params;
        let n = potential.resolution();
        Grid::from_fn(n, |x, y| params.amplitude(potential.get(x, y)))
    }

    pub fn generate(
        &self,
        potential: &BuildabilityPotential,
        map_size_meters: f32,
        seed: u64,
    ) -> Result<(HeightField, WeightedStats)> {
        self.params.validate()?;

        let params = self.params;
        let base = generate_noise_field(&params.noise_config(seed), potential.resolution(), map_size_meters)?;
        let mut data = base.into_vec();

        data.par_iter_mut()
            .zip(potential.data().par_iter())
            .for_each(|(h, &p)| *h *= params.amplitude(p));

        let (raw_min, raw_max) = data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let normalization = smart_normalize(&mut data);

        log::debug!(
            "weighted terrain: raw range [{:.4}, {:.4}], {:?}",
            raw_min,
            raw_max,
            normalization
        );

        let terrain = HeightField::from_vec(potential.resolution(), data)?;
        Ok((
            terrain,
            WeightedStats {
                raw_min,
                raw_max,
                normalization,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::analysis::gradient_stats;

    const MAP: f32 = 14_336.0;

    fn ramp(n: usize) -> BuildabilityPotential {
        BuildabilityPotential::from_fn(n, |x, _| x as f32 / (n - 1) as f32)
    }

    #[test]
    fn test_amplitude_is_non_increasing() {
        let params = TerrainParams::default();
        let mut previous = f32::INFINITY;
        for i in 0..=100 {
            let a = params.amplitude(i as f32 / 100.0);
            assert!(a <= previous, "amplitude rose at P = {}", i as f32 / 100.0);
            previous = a;
        }
        assert!((params.amplitude(0.0) - 0.15).abs() < 1e-6);
        assert!((params.amplitude(1.0) - 0.045).abs() < 1e-6);
    }

    #[test]
    fn test_amplitude_field_gradient_is_bounded() {
        let n = 64;
        let generator = WeightedTerrainGenerator::new(TerrainParams::default());
        let amplitude = generator.amplitude_field(&ramp(n));
        let (_, max) = gradient_stats(&amplitude);
        // dA/dP = base · (max − min) = 0.105, dP = 1/63 per cell
        assert!(max <= 0.105 / 63.0 + 1e-5, "max amplitude gradient {}", max);
    }

    #[test]
    fn test_smart_normalize_clamps_near_unit_range() {
        let mut data = vec![-0.05, 0.2, 0.5, 1.05];
        assert_eq!(smart_normalize(&mut data), NormalizationMode::Clamped);
        assert_eq!(data, vec![0.0, 0.2, 0.5, 1.0]);
    }

    #[test]
    fn test_smart_normalize_stretches_wide_range() {
        let mut data = vec![-1.0, 0.0, 3.0];
        assert_eq!(smart_normalize(&mut data), NormalizationMode::Stretched);
        assert_eq!(data, vec![0.0, 0.25, 1.0]);
    }

    #[test]
    fn test_small_range_is_not_amplified() {
        let mut data = vec![0.1, 0.11, 0.12];
        smart_normalize(&mut data);
        assert_eq!(data, vec![0.1, 0.11, 0.12]);
    }

    #[test]
    fn test_generated_terrain_in_unit_range() {
        let n = 128;
        let generator = WeightedTerrainGenerator::new(TerrainParams::default());
        let (terrain, stats) = generator.generate(&ramp(n), MAP, 42).unwrap();
        assert_eq!(terrain.resolution(), n);
        assert_eq!(stats.normalization, NormalizationMode::Clamped);
        assert!(terrain.data().iter().all(|h| (0.0..=1.0).contains(h)));
        assert!(stats.raw_max <= 0.15 + 1e-6);
    }

    #[test]
    fn test_buildable_side_has_less_relief() {
        let n = 128;
        let generator = WeightedTerrainGenerator::new(TerrainParams::default());
        let (terrain, _) = generator.generate(&ramp(n), MAP, 9).unwrap();

        let spread = |x0: usize, x1: usize| {
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for y in 0..n {
                for &h in &terrain.row(y)[x0..x1] {
                    lo = lo.min(h);
                    hi = hi.max(h);
                }
            }
            hi - lo
        };

        // P ≈ 0 on the left, P ≈ 1 on the right
        let scenic = spread(0, 16);
        let buildable = spread(n - 16, n);
        assert!(buildable < scenic, "buildable {} scenic {}", buildable, scenic);
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let generator = WeightedTerrainGenerator::new(TerrainParams::default());
        let (a, _) = generator.generate(&ramp(64), MAP, 5).unwrap();
        let (b, _) = generator.generate(&ramp(64), MAP, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parameter_ranges() {
        let ok = TerrainParams::default();
        assert!(ok.validate().is_ok());
        assert!(TerrainParams { min_mult: 0.1, ..ok }.validate().is_err());
        assert!(TerrainParams { max_mult: 1.3, ..ok }.validate().is_err());
        assert!(TerrainParams { octaves: 0, ..ok }.validate().is_err());
        assert!(TerrainParams { base_amplitude: 0.0, ..ok }.validate().is_err());
    }
}
