use super::OnlineMoments;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Normal height distribution summarising the samples of one cell or the
/// prediction of one plane.
///
/// Density and divergence functions assume `variance > 0`; callers floor
/// the variance with [`HeightDistribution::with_variance_floor`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightDistribution {
    pub mean: f64,
    pub variance: f64,
}

impl HeightDistribution {
    pub fn new(mean: f64, variance: f64) -> Self {
        Self { mean, variance }
    }

    pub fn from_moments(moments: &OnlineMoments, variance_floor: f64) -> Self {
        Self::new(moments.mean(), moments.variance()).with_variance_floor(variance_floor)
    }

    pub fn with_variance_floor(self, floor: f64) -> Self {
        Self {
            mean: self.mean,
            variance: self.variance.max(floor),
        }
    }

    pub fn ln_pdf(&self, x: f64) -> f64 {
        let d = x - self.mean;
        -0.5 * ((2.0 * PI * self.variance).ln() + d * d / self.variance)
    }

    pub fn pdf(&self, x: f64) -> f64 {
        self.ln_pdf(x).exp()
    }

    /// KL(self ‖ other) for univariate normals.
    pub fn kl_divergence(&self, other: &HeightDistribution) -> f64 {
        let d = self.mean - other.mean;
        0.5 * ((other.variance / self.variance).ln() + (self.variance + d * d) / other.variance
            - 1.0)
    }

    /// KL(a ‖ b) + KL(b ‖ a).
    pub fn symmetric_kl(&self, other: &HeightDistribution) -> f64 {
        (self.kl_divergence(other) + other.kl_divergence(self)).max(0.0)
    }
}

/// Numerically stable logistic function.
#[inline]
pub fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
