//! Diagnostics returned next to every [`TerrainResult`](crate::TerrainResult).
//!
//! `ProcessingReport` bundles the result with a `PipelineTrace`: per-stage
//! records (grid, graph, segmentation, mixture, every smoothing pass, final
//! labelling), stage timings and any failure the processor recovered from.

pub mod pipeline;
pub mod stages;
pub mod timing;

pub use pipeline::{InputDescriptor, PipelineTrace, ProcessingReport, StageFailure};
pub use stages::{
    GraphStage, GridStage, LabelingSource, LabelingStage, MixtureStage, SegmentationStage,
    SmoothingStage,
};
pub use timing::{StageClock, StageTiming, TimingBreakdown};
