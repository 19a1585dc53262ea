use crate::dem::GridGeometry;
use crate::processor::PipelineStage;
use serde::{Deserialize, Serialize};

/// (row, column) address of a DEM cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Fitted plane attached to a final label.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaneSummary {
    pub label: usize,
    /// Index of the mixture component the label was compacted from.
    pub component: usize,
    /// `[c0, cx, cy]` for `z = c0 + cx·x + cy·y`.
    pub coefficients: [f64; 3],
    pub variance: f64,
    pub weight: f64,
    pub cells: usize,
}

/// Label distribution of one cell after smoothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMarginal {
    pub cell: CellIndex,
    pub distribution: Vec<f64>,
}

/// Output of one pipeline run, consumed by renderers and the evaluator.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainResult {
    pub valid: bool,
    pub stage: PipelineStage,
    pub geometry: GridGeometry,
    /// Row-major label per cell; `None` for empty or discarded cells.
    pub labels: Vec<Option<usize>>,
    pub num_labels: usize,
    pub planes: Vec<PlaneSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marginals: Option<Vec<CellMarginal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_partition: Option<f64>,
    pub latency_ms: f64,
}

impl TerrainResult {
    pub(crate) fn empty(geometry: GridGeometry) -> Self {
        let cells = geometry.rows * geometry.cols;
        Self {
            valid: false,
            stage: PipelineStage::Empty,
            geometry,
            labels: vec![None; cells],
            num_labels: 0,
            planes: Vec::new(),
            marginals: None,
            log_partition: None,
            latency_ms: 0.0,
        }
    }

    pub fn label_at(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.geometry.rows || col >= self.geometry.cols {
            return None;
        }
        self.labels[row * self.geometry.cols + col]
    }

    /// Iterate over every labelled cell in row-major order.
    pub fn labelled_cells(&self) -> impl Iterator<Item = (CellIndex, usize)> + '_ {
        let cols = self.geometry.cols;
        self.labels
            .iter()
            .enumerate()
            .filter_map(move |(i, l)| l.map(|label| (CellIndex::new(i / cols, i % cols), label)))
    }

    pub fn labelled_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }
}
