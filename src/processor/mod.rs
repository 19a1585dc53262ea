//! Pipeline orchestration.
//!
//! [`TerrainProcessor`] owns the parameters and the per-stage engines and
//! drives one batch run through the [`PipelineStage`]s:
//!
//! - `GridBuilt`: points routed into the DEM. No valid cell stops here.
//! - `GraphBuilt`: 4-neighbourhood graph with KL edge weights.
//! - `Segmented`: Felzenszwalb components.
//! - `MixtureFit`: one plane per component refined by EM. A degenerate
//!   mixture stops here with a single label on every valid cell.
//! - `Smoothed`: belief propagation over the pairwise MRF, optionally
//!   alternated with mixture refits. Inference failures keep the mixture
//!   posterior labelling.
//!
//! Any stop or fallback clears the validity flag of the result.

mod params;
mod pipeline;
mod state;

pub use params::{ProcessorParams, SegmentationParams};
pub use pipeline::TerrainProcessor;
pub use state::{PipelineStage, PipelineState};
