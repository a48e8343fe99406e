// 地形生成模块

pub mod analysis;
pub mod erosion;
pub mod error;
pub mod grid;
pub mod math;
pub mod noise;
pub mod pipeline;
pub mod ridges;
pub mod weighted;
pub mod zones;

pub use analysis::{buildable_percent, slope_field, TerrainScale, DEFAULT_BUILDABLE_MAX_SLOPE};
pub use erosion::{erode, ErosionMode, ErosionParams, ErosionStats, HydraulicErosion, Termination, TerminationCounts};
pub use error::{GenerationError, Result, Stage};
pub use grid::{BuildabilityPotential, Grid, HeightField};
pub use noise::{generate_noise_field, NoiseConfig, NoiseGenerator};
pub use pipeline::{run_pipeline, GenerationStatistics, PipelineConfig, StageTiming, TerrainPipeline};
pub use ridges::{RidgeEnhancer, RidgeParams, RidgeStats};
pub use weighted::{smart_normalize, NormalizationMode, TerrainParams, WeightedStats, WeightedTerrainGenerator};
pub use zones::{generate_zones, ZoneGenerator, ZoneParams, ZoneStats};
