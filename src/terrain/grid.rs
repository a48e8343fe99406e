//! Square grids shared by every stage.
//!
//! [`HeightField`] is an owned buffer that moves from stage to stage; a stage
//! consumes it by value and hands it back when done. [`BuildabilityPotential`]
//! is created once by the zone generator and has no mutating API at all.

use super::error::{GenerationError, Result, Stage};

/// Dense row-major square grid of `f32`
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    resolution: usize,
    data: Vec<f32>,
}

impl Grid {
    pub fn new(resolution: usize) -> Self {
        Self::filled(resolution, 0.0)
    }

    pub fn filled(resolution: usize, value: f32) -> Self {
        Self {
            resolution,
            data: vec![value; resolution * resolution],
        }
    }

    pub fn from_vec(resolution: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != resolution * resolution {
            return Err(GenerationError::DimensionMismatch {
                expected: resolution,
                actual: (data.len() as f64).sqrt() as usize,
            });
        }
        Ok(Self { resolution, data })
    }

    pub(crate) fn from_parts(resolution: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), resolution * resolution);
        Self { resolution, data }
    }

    /// Build a grid by evaluating `f(x, y)` for every cell
    pub fn from_fn(resolution: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(resolution * resolution);
        for y in 0..resolution {
            for x in 0..resolution {
                data.push(f(x, y));
            }
        }
        Self { resolution, data }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.resolution + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.resolution + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.resolution;
        &self.data[start..start + self.resolution]
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// (min, max) over all cells; (0, 0) for an empty grid
    pub fn min_max(&self) -> (f32, f32) {
        if self.data.is_empty() {
            return (0.0, 0.0);
        }
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Fail on the first NaN/Infinity, reporting the stage that produced it
    pub fn ensure_finite(&self, stage: Stage, context: impl FnOnce() -> String) -> Result<()> {
        match self.data.iter().position(|v| !v.is_finite()) {
            None => Ok(()),
            Some(index) => Err(GenerationError::NonFinite {
                stage,
                index,
                value: self.data[index],
                context: context(),
            }),
        }
    }
}

/// Terrain elevations, conceptually normalized to [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    grid: Grid,
}

impl HeightField {
    pub fn new(resolution: usize) -> Self {
        Self {
            grid: Grid::new(resolution),
        }
    }

    pub fn filled(resolution: usize, value: f32) -> Self {
        Self {
            grid: Grid::filled(resolution, value),
        }
    }

    pub fn from_vec(resolution: usize, data: Vec<f32>) -> Result<Self> {
        Grid::from_vec(resolution, data).map(Self::from)
    }

    pub fn from_fn(resolution: usize, f: impl FnMut(usize, usize) -> f32) -> Self {
        Self {
            grid: Grid::from_fn(resolution, f),
        }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.grid.resolution()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.grid.get(x, y)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.grid.set(x, y, value);
    }

    pub fn data(&self) -> &[f32] {
        self.grid.data()
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        self.grid.data_mut()
    }

    pub fn row(&self, y: usize) -> &[f32] {
        self.grid.row(y)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.grid.min_max()
    }

    /// Raw bytes of the elevation buffer (native endian `f32`), for exporters
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.grid.data())
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.grid.into_vec()
    }

    /// Clamp every cell into [0, 1] without rescaling
    pub fn clamp_unit(&mut self) {
        for h in self.grid.data_mut() {
            *h = h.clamp(0.0, 1.0);
        }
    }

    pub fn ensure_finite(&self, stage: Stage, context: impl FnOnce() -> String) -> Result<()> {
        self.grid.ensure_finite(stage, context)
    }
}

impl From<Grid> for HeightField {
    fn from(grid: Grid) -> Self {
        Self { grid }
    }
}

/// Continuous [0, 1] field describing how developable each cell should become.
///
/// Never renormalized or mutated after creation: its absolute scale feeds the
/// amplitude and erosion formulas directly.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildabilityPotential {
    grid: Grid,
}

impl BuildabilityPotential {
    /// Wrap an externally produced field; every value must lie in [0, 1]
    pub fn from_vec(resolution: usize, data: Vec<f32>) -> Result<Self> {
        let grid = Grid::from_vec(resolution, data)?;
        if let Some(&bad) = grid
            .data()
            .iter()
            .find(|v| !(v.is_finite() && (0.0..=1.0).contains(*v)))
        {
            return Err(GenerationError::invalid(
                "potential",
                bad,
                "every cell within [0, 1]",
            ));
        }
        Ok(Self { grid })
    }

    pub fn from_fn(resolution: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        Self {
            grid: Grid::from_fn(resolution, |x, y| f(x, y).clamp(0.0, 1.0)),
        }
    }

    pub(crate) fn from_grid(grid: Grid) -> Self {
        Self { grid }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.grid.resolution()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.grid.get(x, y)
    }

    pub fn data(&self) -> &[f32] {
        self.grid.data()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Percentage of cells with P above `threshold`
    pub fn coverage_percent(&self, threshold: f32) -> f32 {
        let data = self.grid.data();
        if data.is_empty() {
            return 0.0;
        }
        let count = data.iter().filter(|&&p| p > threshold).count();
        100.0 * count as f32 / data.len() as f32
    }

    /// HeightField and potential must always share dimensions
    pub fn ensure_matches(&self, terrain: &HeightField) -> Result<()> {
        if self.resolution() == terrain.resolution() {
            Ok(())
        } else {
            Err(GenerationError::DimensionMismatch {
                expected: self.resolution(),
                actual: terrain.resolution(),
            })
        }
    }
}
