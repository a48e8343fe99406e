use super::error::{check_positive, check_range, Result};
use super::grid::Grid;
use super::math::fold_seed;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Largest octave count the FBM source accepts
pub const MAX_OCTAVES: usize = 32;

/// Configuration for procedural noise generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Random seed for reproducible generation
    pub seed: u64,

    /// Length of one base-octave feature in meters (lower = more detailed)
    /// Typical range: 500 - 8000
    pub wavelength_meters: f32,

    /// Number of noise layers to combine (more = more detail)
    /// Typical range: 1 - 8
    pub octaves: usize,

    /// How much each octave contributes (amplitude decay)
    /// Typical range: 0.3 - 0.7
    pub persistence: f32,

    /// Frequency multiplier between octaves
    /// Typical range: 1.5 - 3.0
    pub lacunarity: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            wavelength_meters: 2000.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

impl NoiseConfig {
    /// Create a new noise configuration with custom parameters
    pub fn new(seed: u64, wavelength_meters: f32, octaves: usize, persistence: f32, lacunarity: f32) -> Self {
        Self {
            seed,
            wavelength_meters,
            octaves,
            persistence,
            lacunarity,
        }
    }

    /// Large smooth regions, used for buildability zones
    pub fn smooth(seed: u64) -> Self {
        Self {
            seed,
            wavelength_meters: 6500.0,
            octaves: 2,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }

    /// Full-detail mountain noise
    pub fn terrain(seed: u64) -> Self {
        Self {
            seed,
            wavelength_meters: 3000.0,
            octaves: 6,
            persistence: 0.45,
            lacunarity: 2.0,
        }
    }

    /// Reject configurations the fractal sum cannot be built from
    pub fn validate(&self) -> Result<()> {
        check_range("noise.octaves", self.octaves, 1, MAX_OCTAVES, "an octave count in 1..=32")?;
        check_positive("noise.wavelength_meters", self.wavelength_meters)?;
        check_positive("noise.persistence", self.persistence)?;
        check_positive("noise.lacunarity", self.lacunarity)?;
        Ok(())
    }
}

/// Multi-layered noise generator using Fractional Brownian Motion (FBM)
pub struct NoiseGenerator {
    fbm: Fbm<Perlin>,
    frequency: f64,
}

impl NoiseGenerator {
    /// Create a new noise generator from configuration.
    ///
    /// The configuration is expected to be validated.
    pub fn new(config: &NoiseConfig) -> Self {
        let fbm = Fbm::<Perlin>::new(fold_seed(config.seed))
            .set_octaves(config.octaves)
            .set_frequency(1.0)
            .set_persistence(config.persistence as f64)
            .set_lacunarity(config.lacunarity as f64);

        Self {
            fbm,
            frequency: 1.0 / config.wavelength_meters as f64,
        }
    }

    /// Raw fractal value at a position in meters, roughly in [-1, 1]
    #[inline]
    pub fn sample(&self, x_meters: f64, y_meters: f64) -> f64 {
        self.fbm.get([x_meters * self.frequency, y_meters * self.frequency])
    }
}

/// Generate a `resolution`×`resolution` FBM field covering `map_size_meters`,
/// normalized to [0, 1] by its own min/max.
///
/// Deterministic for a fixed configuration. Rows are computed in parallel;
/// every cell is a pure function of its coordinates.
pub fn generate_noise_field(config: &NoiseConfig, resolution: usize, map_size_meters: f32) -> Result<Grid> {
    config.validate()?;
    check_positive("map_size_meters", map_size_meters)?;
    check_range("resolution", resolution, 2, 1 << 16, "a resolution in 2..=65536")?;

    let generator = NoiseGenerator::new(config);
    let cell = map_size_meters as f64 / resolution as f64;

    let mut data = vec![0.0f32; resolution * resolution];
    data.par_chunks_mut(resolution)
        .enumerate()
        .for_each(|(y, row)| {
            let wy = (y as f64 + 0.5) * cell;
            for (x, v) in row.iter_mut().enumerate() {
                let wx = (x as f64 + 0.5) * cell;
                *v = generator.sample(wx, wy) as f32;
            }
        });

    normalize_min_max(&mut data);
    Ok(Grid::from_parts(resolution, data))
}

/// Stretch values to [0, 1]. A constant field maps to 0.5.
pub fn normalize_min_max(data: &mut [f32]) {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    if range.is_nan() || range <= f32::EPSILON {
        data.iter_mut().for_each(|v| *v = 0.5);
        return;
    }
    data.par_iter_mut().for_each(|v| *v = ((*v - lo) / range).clamp(0.0, 1.0));
}
