//! Mixture of planar regressions fitted by expectation–maximisation.
//!
//! Each usable cell contributes one sample (centre, mean height, height
//! variance, point count). The mixture is seeded with one plane per
//! segmentation component and refined by EM; components that lose all
//! support or become singular are deactivated (zero weight) rather than
//! removed, so component indices stay stable.

mod em;
mod options;
mod regression;
mod sample;

pub use em::{PlaneMixture, PlaneMixtureEstimator};
pub use options::MixtureOptions;
pub use regression::PlaneRegression;
pub use sample::{PlaneSample, SampleSet};
