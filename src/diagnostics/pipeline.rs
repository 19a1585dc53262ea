use super::{
    GraphStage, GridStage, LabelingStage, MixtureStage, SegmentationStage, SmoothingStage,
    TimingBreakdown,
};
use crate::dem::GridGeometry;
use crate::error::TerrainError;
use crate::processor::PipelineStage;
use crate::types::TerrainResult;
use serde::Serialize;

/// Result of [`TerrainProcessor::process`](crate::TerrainProcessor::process).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingReport {
    pub result: TerrainResult,
    pub trace: PipelineTrace,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub points: usize,
    pub rows: usize,
    pub cols: usize,
    pub cell_size: [f64; 2],
}

impl InputDescriptor {
    pub fn new(points: usize, geometry: &GridGeometry) -> Self {
        Self {
            points,
            rows: geometry.rows,
            cols: geometry.cols,
            cell_size: geometry.cell_size,
        }
    }
}

/// Error that stopped or degraded a stage.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub code: &'static str,
    pub message: String,
    pub recovered: bool,
}

impl StageFailure {
    pub fn new(stage: PipelineStage, err: &TerrainError) -> Self {
        Self {
            stage,
            code: err.code(),
            message: err.to_string(),
            recovered: err.is_recoverable(),
        }
    }
}

/// Stage-by-stage record of one processor run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrace {
    pub input: InputDescriptor,
    pub timings: TimingBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixture: Option<MixtureStage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub smoothing: Vec<SmoothingStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labeling: Option<LabelingStage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<StageFailure>,
}

impl PipelineTrace {
    pub fn new(input: InputDescriptor) -> Self {
        Self {
            input,
            timings: TimingBreakdown::default(),
            grid: None,
            graph: None,
            segmentation: None,
            mixture: None,
            smoothing: Vec::new(),
            labeling: None,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, stage: PipelineStage, err: &TerrainError) {
        self.failures.push(StageFailure::new(stage, err));
    }

    /// Log-partition of the last smoothing pass.
    pub fn final_log_partition(&self) -> Option<f64> {
        self.smoothing.last().map(|s| s.log_partition)
    }
}
