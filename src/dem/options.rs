use super::GridGeometry;
use crate::error::{Result, TerrainError};
use serde::{Deserialize, Serialize};

/// Options controlling DEM construction and cell bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DemOptions {
    pub geometry: GridGeometry,
    /// Points below this height are discarded.
    pub min_height: f64,
    /// Points above this height are discarded.
    pub max_height: f64,
    /// Minimum point count for a cell to feed the plane regressions, and
    /// minimum cell support for a label to survive compaction.
    pub min_points_per_plane: usize,
    /// Lower bound applied to cell variances before any density or
    /// divergence is evaluated.
    pub variance_floor: f64,
}

impl Default for DemOptions {
    fn default() -> Self {
        Self {
            geometry: GridGeometry::default(),
            min_height: -10.0,
            max_height: 10.0,
            min_points_per_plane: 3,
            variance_floor: 1e-6,
        }
    }
}

impl DemOptions {
    pub fn with_geometry(mut self, geometry: GridGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_height_range(mut self, min_height: f64, max_height: f64) -> Self {
        self.min_height = min_height;
        self.max_height = max_height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        if !self.min_height.is_finite() || !self.max_height.is_finite() {
            return Err(TerrainError::config("height filter bounds must be finite"));
        }
        if self.min_height >= self.max_height {
            return Err(TerrainError::config(format!(
                "min_height ({}) must be below max_height ({})",
                self.min_height, self.max_height
            )));
        }
        if self.min_points_per_plane == 0 {
            return Err(TerrainError::config("min_points_per_plane must be at least 1"));
        }
        if !(self.variance_floor > 0.0) || !self.variance_floor.is_finite() {
            return Err(TerrainError::config(format!(
                "variance_floor must be positive, got {}",
                self.variance_floor
            )));
        }
        Ok(())
    }
}
