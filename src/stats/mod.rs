//! Small statistical primitives consumed by the pipeline.
//!
//! - [`OnlineMoments`]: single-pass (Welford) mean/variance accumulator used
//!   by every DEM cell.
//! - [`HeightDistribution`]: univariate normal summary with pdf and KL
//!   divergence, used for edge weights, mixture likelihoods and MRF factors.
//! - [`PlaneLeastSquares`]: weighted normal equations for `z = c0 + cx·x + cy·y`.

mod gaussian;
mod least_squares;
mod online;

pub use gaussian::{logistic, HeightDistribution};
pub use least_squares::PlaneLeastSquares;
pub use online::OnlineMoments;

/// Index of the largest entry; the lowest index wins ties. Empty slices map
/// to 0.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::argmax;

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.5]), 0);
        assert_eq!(argmax(&[]), 0);
    }
}
