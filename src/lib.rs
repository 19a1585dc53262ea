#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod diagnostics;
pub mod error;
pub mod evaluation;
pub mod processor;
pub mod types;

// Building blocks, public for tools and experiments.
pub mod config;
pub mod dem;
pub mod graph;
pub mod io;
pub mod mixture;
pub mod mrf;
pub mod stats;

// --- High-level re-exports -------------------------------------------------

pub use crate::error::{Result, TerrainError};
pub use crate::processor::{PipelineStage, ProcessorParams, TerrainProcessor};
pub use crate::types::{CellIndex, TerrainResult};

pub use crate::diagnostics::{PipelineTrace, ProcessingReport};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use terrain_classifier::prelude::*;
/// use nalgebra::Point3;
///
/// # fn main() -> terrain_classifier::Result<()> {
/// let points: Vec<Point3<f64>> = (0..400)
///     .map(|i| Point3::new((i % 20) as f64 * 0.1 + 0.05, (i / 20) as f64 * 0.1 + 0.05, 2.0))
///     .collect();
/// let mut processor = TerrainProcessor::new(ProcessorParams::default())?;
/// let report = processor.process(points);
/// println!("valid={} labels={}", report.result.valid, report.result.num_labels);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::dem::{DemOptions, GridGeometry};
    pub use crate::{ProcessorParams, TerrainProcessor, TerrainResult};
}

// --- Stage-level API (for tools & advanced users) --------------------------

pub mod stages {
    pub use crate::dem::{Cell, Dem, DenseLabels, LabelCompaction, LabelSource};
    pub use crate::graph::{Component, GraphSegmenter, RegionGraph, Segmentation};
    pub use crate::mixture::{PlaneMixture, PlaneMixtureEstimator, SampleSet};
    pub use crate::mrf::{BeliefPropagation, InferenceResult, PairwiseLabelSmoother, PairwiseMrf};

    pub use crate::diagnostics::{
        GraphStage, GridStage, InputDescriptor, LabelingSource, LabelingStage, MixtureStage,
        SegmentationStage, SmoothingStage, StageFailure, StageTiming, TimingBreakdown,
    };
}
