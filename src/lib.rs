#![warn(clippy::all, rust_2018_idioms)]

pub mod terrain;

pub use terrain::{
    run_pipeline, BuildabilityPotential, GenerationError, GenerationStatistics, HeightField, PipelineConfig,
    TerrainPipeline,
};
