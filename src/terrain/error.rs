//! Error taxonomy for terrain generation.
//!
//! Parameter problems are reported before any stage runs, numerical integrity
//! failures abort the run with the failing stage attached. Missing the
//! buildable target band is not an error at all, see
//! [`GenerationStatistics::target_met`](crate::terrain::GenerationStatistics).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage, used for diagnostics and timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Validation,
    Zones,
    WeightedTerrain,
    Ridges,
    Erosion,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Zones => "zones",
            Stage::WeightedTerrain => "weighted-terrain",
            Stage::Ridges => "ridges",
            Stage::Erosion => "erosion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid parameter `{name}` = {value}: expected {expected}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("buildability potential too rough: mean gradient {mean_gradient:.5} per cell exceeds {bound}")]
    ZoneGradientTooHigh { mean_gradient: f32, bound: f32 },

    #[error("grid dimension mismatch: expected {expected}x{expected}, got {actual}x{actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("stage `{stage}` produced non-finite value {value} at cell {index} ({context})")]
    NonFinite {
        stage: Stage,
        index: usize,
        value: f32,
        context: String,
    },

    #[error("generation cancelled during `{stage}`")]
    Cancelled { stage: Stage },
}

pub type Result<T> = std::result::Result<T, GenerationError>;

impl GenerationError {
    pub(crate) fn invalid(name: &'static str, value: impl fmt::Display, expected: &'static str) -> Self {
        GenerationError::InvalidParameter {
            name,
            value: value.to_string(),
            expected,
        }
    }
}

/// Range checks shared by the parameter structs
pub(crate) fn check_range<T>(name: &'static str, value: T, min: T, max: T, expected: &'static str) -> Result<()>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(GenerationError::invalid(name, value, expected))
    }
}

pub(crate) fn check_positive(name: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GenerationError::invalid(name, value, "a finite value > 0"))
    }
}
