/// Normalized Gaussian footprint used to spread a height change over a disk
/// of cells instead of a single one.
#[derive(Debug, Clone)]
pub struct Brush {
    radius: usize,
    taps: Vec<(isize, isize, f32)>,
}

impl Brush {
    /// Disk of `radius` cells with σ = radius / 2; weights sum to 1
    pub fn gaussian(radius: usize) -> Self {
        let r = radius as isize;
        let sigma = (radius as f32 / 2.0).max(0.5);
        let two_sigma_sq = 2.0 * sigma * sigma;

        let mut taps = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let dist_sq = (dx * dx + dy * dy) as f32;
                if dist_sq <= (r * r) as f32 {
                    taps.push((dx, dy, (-dist_sq / two_sigma_sq).exp()));
                }
            }
        }

        let total: f32 = taps.iter().map(|t| t.2).sum();
        for tap in &mut taps {
            tap.2 /= total;
        }

        Self { radius, taps }
    }

    pub fn taps(&self) -> &[(isize, isize, f32)] {
        &self.taps
    }

    /// Visit every in-grid cell under the brush centered on (cx, cy) with its
    /// weight. Near the border the weights are renormalized over the cells
    /// that remain, so the full amount always lands on the grid.
    #[inline]
    pub fn for_each_cell(&self, cx: usize, cy: usize, n: usize, mut f: impl FnMut(usize, f32)) {
        let r = self.radius;
        let interior = cx >= r && cy >= r && cx + r < n && cy + r < n;

        let norm = if interior {
            1.0
        } else {
            self.taps
                .iter()
                .filter(|&&(dx, dy, _)| in_grid(cx, cy, dx, dy, n))
                .map(|t| t.2)
                .sum::<f32>()
        };
        if norm <= 0.0 {
            return;
        }

        for &(dx, dy, w) in &self.taps {
            if interior || in_grid(cx, cy, dx, dy, n) {
                let x = (cx as isize + dx) as usize;
                let y = (cy as isize + dy) as usize;
                f(y * n + x, w / norm);
            }
        }
    }
}

#[inline]
fn in_grid(cx: usize, cy: usize, dx: isize, dy: isize, n: usize) -> bool {
    let x = cx as isize + dx;
    let y = cy as isize + dy;
    x >= 0 && y >= 0 && (x as usize) < n && (y as usize) < n
}
