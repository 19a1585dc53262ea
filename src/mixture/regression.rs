use crate::stats::HeightDistribution;
use nalgebra::Vector3;
use serde::Serialize;

/// One planar component `z = c0 + cx·x + cy·y` with Gaussian residuals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaneRegression {
    pub coefficients: Vector3<f64>,
    pub variance: f64,
    /// Mixing weight; zero marks an inactive component.
    pub weight: f64,
}

impl Default for PlaneRegression {
    fn default() -> Self {
        Self::inactive()
    }
}

impl PlaneRegression {
    pub fn new(coefficients: Vector3<f64>, variance: f64, weight: f64) -> Self {
        Self {
            coefficients,
            variance,
            weight,
        }
    }

    pub fn inactive() -> Self {
        Self::new(Vector3::zeros(), 0.0, 0.0)
    }

    #[inline]
    pub fn predict(&self, x: f64, y: f64) -> f64 {
        let c = &self.coefficients;
        c[0] + c[1] * x + c[2] * y
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }

    /// Predicted height distribution at `(x, y)` with the variance floored.
    pub fn distribution_at(&self, x: f64, y: f64, min_variance: f64) -> HeightDistribution {
        HeightDistribution::new(self.predict(x, y), self.variance).with_variance_floor(min_variance)
    }

    pub fn coefficients_array(&self) -> [f64; 3] {
        [self.coefficients[0], self.coefficients[1], self.coefficients[2]]
    }
}
