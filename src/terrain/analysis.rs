//! Terrain measurements: slope, buildability and field smoothness.

use super::error::{check_positive, Result};
use super::grid::{Grid, HeightField};
use super::math::cell_gradient;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default maximum grade of a buildable cell (5 %)
pub const DEFAULT_BUILDABLE_MAX_SLOPE: f32 = 0.05;

/// Physical scale of a normalized height field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainScale {
    /// Horizontal size of one cell in meters
    pub cell_size_meters: f32,
    /// Elevation in meters of a normalized height of 1.0
    pub height_scale_meters: f32,
}

impl TerrainScale {
    pub fn new(resolution: usize, map_size_meters: f32, height_scale_meters: f32) -> Result<Self> {
        check_positive("map_size_meters", map_size_meters)?;
        check_positive("height_scale_meters", height_scale_meters)?;
        Ok(Self {
            cell_size_meters: map_size_meters / resolution.max(1) as f32,
            height_scale_meters,
        })
    }

    /// Converts a per-cell normalized height difference into a grade
    #[inline]
    pub fn grade_factor(&self) -> f32 {
        self.height_scale_meters / self.cell_size_meters
    }
}

/// Grade (rise over run) at every cell, from central differences
pub fn slope_field(terrain: &HeightField, scale: &TerrainScale) -> Grid {
    let n = terrain.resolution();
    let data = terrain.data();
    let factor = scale.grade_factor();
    if n == 0 {
        return Grid::new(0);
    }

    let mut slopes = vec![0.0f32; n * n];
    slopes
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, s) in row.iter_mut().enumerate() {
                let (dx, dy) = cell_gradient(data, n, x, y);
                *s = (dx * dx + dy * dy).sqrt() * factor;
            }
        });

    Grid::from_parts(n, slopes)
}

/// Percentage of cells whose grade is at most `max_slope`
pub fn buildable_percent(terrain: &HeightField, scale: &TerrainScale, max_slope: f32) -> f32 {
    let n = terrain.resolution();
    if n == 0 {
        return 0.0;
    }
    let data = terrain.data();
    let factor = scale.grade_factor();

    let buildable: usize = (0..n)
        .into_par_iter()
        .map(|y| {
            (0..n)
                .filter(|&x| {
                    let (dx, dy) = cell_gradient(data, n, x, y);
                    (dx * dx + dy * dy).sqrt() * factor <= max_slope
                })
                .count()
        })
        .sum();

    100.0 * buildable as f32 / (n * n) as f32
}

/// Mean and max gradient magnitude of a grid, in value units per cell
pub fn gradient_stats(grid: &Grid) -> (f32, f32) {
    let n = grid.resolution();
    if n == 0 {
        return (0.0, 0.0);
    }
    let data = grid.data();

    let rows: Vec<(f64, f32)> = (0..n)
        .into_par_iter()
        .map(|y| {
            let mut sum = 0.0f64;
            let mut max = 0.0f32;
            for x in 0..n {
                let (dx, dy) = cell_gradient(data, n, x, y);
                let g = (dx * dx + dy * dy).sqrt();
                sum += g as f64;
                max = max.max(g);
            }
            (sum, max)
        })
        .collect();
    // Row order, not rayon's split order
    let (sum, max) = rows
        .iter()
        .fold((0.0f64, 0.0f32), |acc, row| (acc.0 + row.0, acc.1.max(row.1)));

    ((sum / (n * n) as f64) as f32, max)
}

/// Number of distinct values after quantizing [0, 1] into `levels` steps
pub fn distinct_levels(data: &[f32], levels: u32) -> usize {
    let scale = levels as f32;
    data.iter()
        .map(|v| (v.clamp(0.0, 1.0) * scale).round() as u32)
        .collect::<HashSet<_>>()
        .len()
}

/// Fraction of values strictly inside (lo, hi)
pub fn fraction_between(data: &[f32], lo: f32, hi: f32) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().filter(|&&v| v > lo && v < hi).count() as f32 / data.len() as f32
}

/// Mean variance of (2r+1)² windows centered on the cells selected by `mask`
pub fn mean_local_variance(grid: &Grid, radius: usize, mask: impl Fn(usize, usize) -> bool) -> f32 {
    let n = grid.resolution();
    let mut total = 0.0f64;
    let mut count = 0usize;

    for y in 0..n {
        for x in 0..n {
            if !mask(x, y) {
                continue;
            }
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(n - 1);
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius).min(n - 1);

            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            let mut k = 0usize;
            for wy in y0..=y1 {
                for &v in &grid.row(wy)[x0..=x1] {
                    sum += v as f64;
                    sum_sq += (v as f64) * (v as f64);
                    k += 1;
                }
            }
            let mean = sum / k as f64;
            total += (sum_sq / k as f64 - mean * mean).max(0.0);
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(n: usize, step: f32) -> HeightField {
        HeightField::from_fn(n, |x, _| x as f32 * step)
    }

    #[test]
    fn test_grade_factor() {
        let scale = TerrainScale::new(4096, 14_336.0, 1024.0).unwrap();
        assert!((scale.cell_size_meters - 3.5).abs() < 1e-4);
        assert!((scale.grade_factor() - 1024.0 / 3.5).abs() < 1e-2);
    }

    #[test]
    fn test_flat_terrain_is_fully_buildable() {
        let scale = TerrainScale::new(32, 3200.0, 100.0).unwrap();
        let flat = HeightField::filled(32, 0.4);
        assert_eq!(buildable_percent(&flat, &scale, 0.05), 100.0);
    }

    #[test]
    fn test_plane_grade_threshold() {
        // cell = 100 m, height scale = 100 m: 0.03 per cell -> 3 % grade
        let scale = TerrainScale::new(32, 3200.0, 100.0).unwrap();
        let gentle = plane(32, 0.03);
        let steep = plane(32, 0.08);
        assert_eq!(buildable_percent(&gentle, &scale, 0.05), 100.0);
        assert_eq!(buildable_percent(&steep, &scale, 0.05), 0.0);

        let slopes = slope_field(&gentle, &scale);
        assert!((slopes.get(10, 10) - 0.03).abs() < 1e-4);
    }

    #[test]
    fn test_gradient_stats_on_plane() {
        let field = plane(16, 0.01);
        let (mean, max) = gradient_stats(field.grid());
        assert!((mean - 0.01).abs() < 1e-5);
        assert!((max - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_gradient_stats_independent_of_thread_count() {
        let field = HeightField::from_fn(257, |x, y| ((x as f32 * 0.37).sin() * (y as f32 * 0.11).cos()) * 0.3);
        let stats_with = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| gradient_stats(field.grid()))
        };
        let (mean_1, max_1) = stats_with(1);
        for threads in [2, 3, 8] {
            let (mean, max) = stats_with(threads);
            assert_eq!(mean.to_bits(), mean_1.to_bits(), "{} threads", threads);
            assert_eq!(max, max_1);
        }
    }

    #[test]
    fn test_distinct_levels() {
        let data: Vec<f32> = (0..1000).map(|i| i as f32 / 999.0).collect();
        assert!(distinct_levels(&data, 1000) > 900);
        assert_eq!(distinct_levels(&[0.0, 1.0, 0.0, 1.0], 1000), 2);
    }

    #[test]
    fn test_fraction_between_is_strict() {
        assert_eq!(fraction_between(&[0.1, 0.5, 0.9, 0.95], 0.1, 0.9), 0.25);
    }

    #[test]
    fn test_local_variance_masks() {
        let field = HeightField::from_fn(8, |x, y| if (x + y) % 2 == 0 { 1.0 } else { 0.0 });
        let all = mean_local_variance(field.grid(), 1, |_, _| true);
        let none = mean_local_variance(field.grid(), 1, |_, _| false);
        assert!(all > 0.2);
        assert_eq!(none, 0.0);
        let flat = HeightField::filled(8, 0.3);
        assert!(mean_local_variance(flat.grid(), 1, |_, _| true) < 1e-9);
    }
}
