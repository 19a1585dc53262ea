use crate::dem::{Dem, InsertStats, LabelCompaction};
use crate::graph::{RegionGraph, Segmentation};
use crate::mixture::{PlaneMixture, PlaneRegression, SampleSet};
use crate::mrf::{InferenceMode, Smoothing, UpdateOrder};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridStage {
    pub elapsed_ms: f64,
    pub inserted: InsertStats,
    pub valid_cells: usize,
    pub usable_cells: usize,
}

impl GridStage {
    pub fn new(dem: &Dem, inserted: InsertStats, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            inserted,
            valid_cells: dem.valid_cells_count(),
            usable_cells: dem.usable_cells_count(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStage {
    pub elapsed_ms: f64,
    pub vertices: usize,
    pub edges: usize,
    pub mean_weight: f64,
    pub max_weight: f64,
}

impl GraphStage {
    pub fn new(graph: &RegionGraph, elapsed_ms: f64) -> Self {
        let edges = graph.edge_count();
        let max_weight = graph.edges().iter().map(|e| e.weight).fold(0.0, f64::max);
        Self {
            elapsed_ms,
            vertices: graph.vertex_count(),
            edges,
            mean_weight: if edges > 0 {
                graph.total_weight() / edges as f64
            } else {
                0.0
            },
            max_weight,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationStage {
    pub elapsed_ms: f64,
    pub k: f64,
    pub components: usize,
    pub merges: usize,
    pub largest_component: usize,
}

impl SegmentationStage {
    pub fn new(segmentation: &Segmentation, k: f64, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            k,
            components: segmentation.len(),
            merges: segmentation.merges,
            largest_component: segmentation.largest(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixtureStage {
    pub elapsed_ms: f64,
    pub samples: usize,
    pub components: Vec<PlaneRegression>,
    pub active_components: usize,
    pub iterations: usize,
    pub converged: bool,
    pub log_likelihood: f64,
    pub history: Vec<f64>,
}

impl MixtureStage {
    pub fn new(mixture: &PlaneMixture, samples: &SampleSet, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            samples: samples.len(),
            components: mixture.components.clone(),
            active_components: mixture.active_components(),
            iterations: mixture.iterations,
            converged: mixture.converged,
            log_likelihood: mixture.log_likelihood,
            history: mixture.history.clone(),
        }
    }
}

/// One smoothing pass; `pass` 0 is the initial one, later passes follow a
/// mixture refit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothingStage {
    pub elapsed_ms: f64,
    pub pass: usize,
    pub mode: InferenceMode,
    pub order: UpdateOrder,
    pub labels: usize,
    pub iterations: usize,
    pub converged: bool,
    pub final_delta: f64,
    pub log_partition: f64,
}

impl SmoothingStage {
    pub fn new(smoothing: &Smoothing, order: UpdateOrder, pass: usize, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            pass,
            mode: smoothing.mode,
            order,
            labels: smoothing.label_count,
            iterations: smoothing.iterations,
            converged: smoothing.converged,
            final_delta: smoothing.final_delta,
            log_partition: smoothing.log_partition,
        }
    }
}

/// How the final label assignment was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelingSource {
    /// Marginals or MAP labels from belief propagation.
    Smoothing,
    /// Posterior argmax of the mixture after a failed inference.
    MixtureFallback,
    /// Single label after a degenerate mixture.
    SingleLabel,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelingStage {
    pub source: LabelingSource,
    pub compaction: LabelCompaction,
    pub labelled_cells: usize,
}
