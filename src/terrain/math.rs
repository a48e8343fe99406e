//! Small numeric helpers shared by the stages.

/// Cubic Hermite interpolation between `edge0` and `edge1`, clamped to [0, 1].
///
/// First derivative is zero at both edges, so blends driven by it never crease.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Derive a per-stage seed so stages never share a noise stream
#[inline]
pub fn stage_seed(seed: u64, offset: u64) -> u64 {
    seed.wrapping_add(offset)
}

/// Fold a 64-bit seed into the 32-bit seed a Perlin source takes
#[inline]
pub fn fold_seed(seed: u64) -> u32 {
    // splitmix64 finalizer, so nearby seeds land far apart
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z ^ (z >> 32)) as u32
}

/// True when the bilinear stencil at (x, y) lies fully inside an `n`×`n` grid
#[inline]
pub fn in_interior(x: f32, y: f32, n: usize) -> bool {
    let limit = (n as f32) - 1.0;
    x >= 0.0 && y >= 0.0 && x < limit && y < limit
}

/// Bilinear height at a continuous position. Caller guarantees `in_interior`.
#[inline]
pub fn sample_height(data: &[f32], n: usize, x: f32, y: f32) -> f32 {
    let (x0, y0, fx, fy) = cell_and_offset(x, y);
    let i = y0 * n + x0;
    let h00 = data[i];
    let h10 = data[i + 1];
    let h01 = data[i + n];
    let h11 = data[i + n + 1];
    let h0 = h00 * (1.0 - fx) + h10 * fx;
    let h1 = h01 * (1.0 - fx) + h11 * fx;
    h0 * (1.0 - fy) + h1 * fy
}

/// Bilinear gradient (dh/dx, dh/dy) per cell at a continuous position.
/// Caller guarantees `in_interior`.
#[inline]
pub fn sample_gradient(data: &[f32], n: usize, x: f32, y: f32) -> (f32, f32) {
    let (x0, y0, fx, fy) = cell_and_offset(x, y);
    let i = y0 * n + x0;
    let h00 = data[i];
    let h10 = data[i + 1];
    let h01 = data[i + n];
    let h11 = data[i + n + 1];
    let gx = (h10 - h00) * (1.0 - fy) + (h11 - h01) * fy;
    let gy = (h01 - h00) * (1.0 - fx) + (h11 - h10) * fx;
    (gx, gy)
}

#[inline]
fn cell_and_offset(x: f32, y: f32) -> (usize, usize, f32, f32) {
    let x0 = x.floor();
    let y0 = y.floor();
    (x0 as usize, y0 as usize, x - x0, y - y0)
}

/// Central-difference gradient magnitude at a grid cell, one-sided at edges
#[inline]
pub fn cell_gradient(data: &[f32], n: usize, x: usize, y: usize) -> (f32, f32) {
    let xl = x.saturating_sub(1);
    let xr = (x + 1).min(n - 1);
    let yu = y.saturating_sub(1);
    let yd = (y + 1).min(n - 1);
    let dx = (data[y * n + xr] - data[y * n + xl]) / (xr - xl).max(1) as f32;
    let dy = (data[yd * n + x] - data[yu * n + x]) / (yd - yu).max(1) as f32;
    (dx, dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothstep_edges() {
        assert_eq!(smoothstep(0.2, 0.4, 0.1), 0.0);
        assert_eq!(smoothstep(0.2, 0.4, 0.5), 1.0);
        assert!((smoothstep(0.2, 0.4, 0.3) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_smoothstep_flat_at_edges() {
        let eps = 1e-3;
        let d0 = (smoothstep(0.2, 0.4, 0.2 + eps) - smoothstep(0.2, 0.4, 0.2)) / eps;
        let d1 = (smoothstep(0.2, 0.4, 0.4) - smoothstep(0.2, 0.4, 0.4 - eps)) / eps;
        assert!(d0 < 0.1, "slope at edge0 {}", d0);
        assert!(d1 < 0.1, "slope at edge1 {}", d1);
    }

    #[test]
    fn test_fold_seed_spreads_neighbours() {
        assert_ne!(fold_seed(1), fold_seed(2));
        assert_eq!(fold_seed(42), fold_seed(42));
    }

    #[test]
    fn test_bilinear_on_plane() {
        // h = 0.1 * x + 0.2 * y
        let n = 4;
        let data: Vec<f32> = (0..n * n)
            .map(|i| 0.1 * (i % n) as f32 + 0.2 * (i / n) as f32)
            .collect();
        let h = sample_height(&data, n, 1.5, 0.25);
        assert!((h - (0.15 + 0.05)).abs() < 1e-5);
        let (gx, gy) = sample_gradient(&data, n, 1.5, 0.25);
        assert!((gx - 0.1).abs() < 1e-5);
        assert!((gy - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_interior_excludes_last_row() {
        assert!(in_interior(0.0, 0.0, 4));
        assert!(in_interior(2.99, 2.99, 4));
        assert!(!in_interior(3.0, 1.0, 4));
        assert!(!in_interior(-0.01, 1.0, 4));
    }

    #[test]
    fn test_cell_gradient_edges() {
        let n = 3;
        let data: Vec<f32> = (0..n * n).map(|i| (i % n) as f32).collect();
        assert_eq!(cell_gradient(&data, n, 0, 0), (1.0, 0.0));
        assert_eq!(cell_gradient(&data, n, 1, 1), (1.0, 0.0));
        assert_eq!(cell_gradient(&data, n, 2, 2), (1.0, 0.0));
    }
}
