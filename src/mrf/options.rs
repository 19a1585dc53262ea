use crate::error::{Result, TerrainError};
use crate::stats::{logistic, HeightDistribution};
use serde::{Deserialize, Serialize};

/// Coefficients of the pairwise smoothness factor.
///
/// For neighbouring cells with height summaries `(m1, v1)` and `(m2, v2)` the
/// probability of a label change is
/// `s = logistic(variance_gain·(v1 + v2) − mean_gain·|m1 − m2| + bias)`;
/// equal labels score `1 − s`, different labels `s`, both at least `floor`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothnessPrior {
    pub variance_gain: f64,
    pub mean_gain: f64,
    pub bias: f64,
    pub floor: f64,
}

impl Default for SmoothnessPrior {
    fn default() -> Self {
        Self {
            variance_gain: 1.0,
            mean_gain: 1.0,
            bias: 0.0,
            floor: 1e-12,
        }
    }
}

/// Potts-like table: `same` on the diagonal, `diff` elsewhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairwiseFactor {
    pub same: f64,
    pub diff: f64,
}

impl PairwiseFactor {
    #[inline]
    pub fn value(&self, a: usize, b: usize) -> f64 {
        if a == b {
            self.same
        } else {
            self.diff
        }
    }
}

impl SmoothnessPrior {
    pub fn factor(&self, a: &HeightDistribution, b: &HeightDistribution) -> PairwiseFactor {
        let spread = self.variance_gain * (a.variance + b.variance);
        let jump = self.mean_gain * (a.mean - b.mean).abs();
        let s = logistic(spread - jump + self.bias);
        PairwiseFactor {
            same: (1.0 - s).max(self.floor),
            diff: s.max(self.floor),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if ![self.variance_gain, self.mean_gain, self.bias]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(TerrainError::config("smoothness prior gains must be finite"));
        }
        if !(self.floor > 0.0 && self.floor < 0.5) {
            return Err(TerrainError::config(format!(
                "smoothness floor must lie in (0, 0.5), got {}",
                self.floor
            )));
        }
        Ok(())
    }
}

/// Message-passing objective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InferenceMode {
    /// Marginals (sum-product).
    #[default]
    SumProduct,
    /// MAP labelling (max-product).
    MaxProduct,
}

/// Message update schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOrder {
    /// Variables in index order, messages updated in place.
    Sequential,
    /// Variables reshuffled every sweep.
    #[default]
    Random,
    /// All messages from the previous sweep (flooding).
    Parallel,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    pub mode: InferenceMode,
    pub order: UpdateOrder,
    pub max_iterations: usize,
    /// Converged once the largest message change in a sweep is below this.
    pub tolerance: f64,
    /// Fraction of the previous message kept on update, in `[0, 1)`.
    pub damping: f64,
    /// Seed for the sweep order when the processor owns the generator.
    pub seed: u64,
    /// Treat hitting `max_iterations` as a failure.
    pub require_convergence: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            mode: InferenceMode::SumProduct,
            order: UpdateOrder::Random,
            max_iterations: 100,
            tolerance: 1e-6,
            damping: 0.0,
            seed: 0x7e44a1,
            require_convergence: false,
        }
    }
}

impl InferenceOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(TerrainError::config(
                "inference max_iterations must be at least 1",
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(TerrainError::config(format!(
                "inference tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(TerrainError::config(format!(
                "damping must lie in [0, 1), got {}",
                self.damping
            )));
        }
        Ok(())
    }
}

/// Everything the smoother needs besides the data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingOptions {
    pub prior: SmoothnessPrior,
    pub inference: InferenceOptions,
}

impl SmoothingOptions {
    pub fn validate(&self) -> Result<()> {
        self.prior.validate()?;
        self.inference.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn similar_cells_prefer_equal_labels() {
        let prior = SmoothnessPrior::default();
        let a = HeightDistribution::new(0.0, 1e-4);
        let b = HeightDistribution::new(0.01, 1e-4);
        let f = prior.factor(&a, &b);
        assert!(f.same > f.diff);
        assert_relative_eq!(f.same + f.diff, 1.0, epsilon = 1e-12);

        let far = HeightDistribution::new(3.0, 1e-4);
        let g = prior.factor(&a, &far);
        assert!(g.same > f.same);
        assert_eq!(g.value(1, 1), g.same);
        assert_eq!(g.value(0, 1), g.diff);
    }

    #[test]
    fn factor_values_respect_floor() {
        let prior = SmoothnessPrior {
            mean_gain: 1e6,
            floor: 1e-9,
            ..Default::default()
        };
        let f = prior.factor(
            &HeightDistribution::new(0.0, 0.0),
            &HeightDistribution::new(1.0, 0.0),
        );
        assert_eq!(f.diff, 1e-9);
    }

    #[test]
    fn rejects_bad_inference_options() {
        let mut opts = InferenceOptions::default();
        assert!(opts.validate().is_ok());
        opts.damping = 1.0;
        assert!(opts.validate().is_err());
        opts.damping = 0.5;
        opts.max_iterations = 0;
        assert!(opts.validate().is_err());
    }
}
