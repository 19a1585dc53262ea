//! Scoring a labelling against ground-truth polygons with the V-measure.

mod ground_truth;
mod vmeasure;

pub use ground_truth::{GroundTruth, Polygon};
pub use vmeasure::{evaluate, ContingencyTable, VMeasure};
