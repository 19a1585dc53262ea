//! Region adjacency graph over the DEM and its agglomerative segmentation.

mod disjoint;
mod region;
mod segmentation;

pub use disjoint::DisjointSets;
pub use region::{Edge, RegionGraph};
pub use segmentation::{Component, GraphSegmenter, Segmentation};
