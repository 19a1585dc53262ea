use nalgebra::{Matrix3, Vector3};

/// Weighted normal-equation accumulator for the plane `z = c0 + cx·x + cy·y`.
///
/// Samples are added one at a time with non-negative weights; the 3×3 system
/// `AᵀWA c = AᵀWz` is solved on demand. A determinant below the supplied
/// tolerance is treated as a singular design (e.g. fewer than three samples or
/// collinear sample positions).
#[derive(Clone, Debug)]
pub struct PlaneLeastSquares {
    ata: Matrix3<f64>,
    atb: Vector3<f64>,
    total_weight: f64,
    samples: usize,
}

impl Default for PlaneLeastSquares {
    fn default() -> Self {
        Self {
            ata: Matrix3::zeros(),
            atb: Vector3::zeros(),
            total_weight: 0.0,
            samples: 0,
        }
    }
}

impl PlaneLeastSquares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64, y: f64, z: f64, weight: f64) {
        if !(weight > 0.0) || !weight.is_finite() {
            return;
        }
        let phi = Vector3::new(1.0, x, y);
        self.ata += weight * phi * phi.transpose();
        self.atb += weight * z * phi;
        self.total_weight += weight;
        self.samples += 1;
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn determinant(&self) -> f64 {
        self.ata.determinant()
    }

    /// Solve the normal equations, or `None` for a singular design.
    pub fn solve(&self, det_tolerance: f64) -> Option<Vector3<f64>> {
        if self.total_weight <= 0.0 {
            return None;
        }
        let det = self.determinant();
        if !det.is_finite() || det.abs() < det_tolerance {
            return None;
        }
        let inv = self.ata.try_inverse()?;
        let coeffs = inv * self.atb;
        coeffs.iter().all(|c| c.is_finite()).then_some(coeffs)
    }
}
