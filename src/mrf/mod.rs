//! Pairwise label smoothing.
//!
//! Every valid cell becomes a discrete variable whose domain is the set of
//! mixture components. Unary factors score how well each plane explains the
//! cell; pairwise factors couple 4-neighbours through a logistic function of
//! their height summaries. Loopy belief propagation then yields either
//! marginals (sum-product) or a MAP labelling (max-product).

mod belief;
mod model;
mod options;
mod smoother;

pub use belief::{BeliefPropagation, InferenceResult};
pub use model::PairwiseMrf;
pub use options::{
    InferenceMode, InferenceOptions, PairwiseFactor, SmoothingOptions, SmoothnessPrior,
    UpdateOrder,
};
pub use smoother::{PairwiseLabelSmoother, Smoothing};
