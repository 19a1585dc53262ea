//! Digital elevation map: a fixed grid of cells, each summarising the heights
//! of the points that fall inside it.
//!
//! Points are routed by their `(x, y)` coordinates; `z` feeds the owning
//! cell's running moments. After smoothing, the grid also stores one label
//! distribution per valid cell (see [`Dem::set_label_assignment`]).

mod cell;
mod geometry;
mod grid;
mod options;

pub use cell::Cell;
pub use geometry::GridGeometry;
pub use grid::{
    Dem, DenseLabels, InsertStats, LabelCompaction, LabelSource, PROBABILITY_TOLERANCE,
};
pub use options::DemOptions;
