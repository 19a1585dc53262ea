use crate::error::{Result, TerrainError};
use serde::{Deserialize, Serialize};

/// EM parameters for the plane mixture.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureOptions {
    pub max_iterations: usize,
    /// Stop once the log-likelihood improves by less than this.
    pub tolerance: f64,
    /// Normal-equation determinant below which a design is singular.
    pub singular_tolerance: f64,
    /// Variance floor used when evaluating component densities.
    pub min_variance: f64,
    /// Weight every cell by its point count instead of uniformly.
    pub weight_by_count: bool,
}

impl Default for MixtureOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            singular_tolerance: 1e-12,
            min_variance: 1e-8,
            weight_by_count: true,
        }
    }
}

impl MixtureOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(TerrainError::config("mixture max_iterations must be at least 1"));
        }
        if !(self.tolerance >= 0.0) {
            return Err(TerrainError::config(format!(
                "mixture tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if !(self.singular_tolerance >= 0.0) {
            return Err(TerrainError::config(format!(
                "singular_tolerance must be non-negative, got {}",
                self.singular_tolerance
            )));
        }
        if !(self.min_variance > 0.0) || !self.min_variance.is_finite() {
            return Err(TerrainError::config(format!(
                "min_variance must be positive, got {}",
                self.min_variance
            )));
        }
        Ok(())
    }
}
