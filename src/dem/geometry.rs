use crate::error::{Result, TerrainError};
use crate::types::CellIndex;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Placement of the DEM in the point-cloud frame.
///
/// `origin` is the minimum (x, y) corner; column index grows with x and row
/// index grows with y.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridGeometry {
    pub origin: [f64; 2],
    pub cell_size: [f64; 2],
    pub rows: usize,
    pub cols: usize,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0],
            cell_size: [0.1, 0.1],
            rows: 20,
            cols: 20,
        }
    }
}

impl GridGeometry {
    /// Cover `extent` metres starting at `origin`, rounding the cell counts up.
    pub fn from_extent(origin: [f64; 2], extent: [f64; 2], cell_size: [f64; 2]) -> Result<Self> {
        if !(cell_size[0] > 0.0 && cell_size[1] > 0.0) {
            return Err(TerrainError::config(format!(
                "cell size must be positive, got {:?}",
                cell_size
            )));
        }
        if !(extent[0] > 0.0 && extent[1] > 0.0) {
            return Err(TerrainError::config(format!(
                "grid extent must be positive, got {:?}",
                extent
            )));
        }
        let geometry = Self {
            origin,
            cell_size,
            cols: (extent[0] / cell_size[0]).ceil() as usize,
            rows: (extent[1] / cell_size[1]).ceil() as usize,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(TerrainError::config(format!(
                "grid needs at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }
        let [sx, sy] = self.cell_size;
        if !(sx > 0.0 && sy > 0.0) || !sx.is_finite() || !sy.is_finite() {
            return Err(TerrainError::config(format!(
                "cell size must be positive and finite, got {:?}",
                self.cell_size
            )));
        }
        if !self.origin.iter().all(|v| v.is_finite()) {
            return Err(TerrainError::config("grid origin must be finite"));
        }
        Ok(())
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn extent(&self) -> [f64; 2] {
        [
            self.cols as f64 * self.cell_size[0],
            self.rows as f64 * self.cell_size[1],
        ]
    }

    /// Cell containing `(x, y)`, or `None` outside the grid.
    pub fn locate(&self, x: f64, y: f64) -> Option<CellIndex> {
        let fx = (x - self.origin[0]) / self.cell_size[0];
        let fy = (y - self.origin[1]) / self.cell_size[1];
        // Negated comparisons also reject NaN.
        if !(fx >= 0.0 && fy >= 0.0) || fx >= self.cols as f64 || fy >= self.rows as f64 {
            return None;
        }
        let col = (fx.floor() as usize).min(self.cols - 1);
        let row = (fy.floor() as usize).min(self.rows - 1);
        Some(CellIndex::new(row, col))
    }

    pub fn center(&self, idx: CellIndex) -> Point2<f64> {
        Point2::new(
            self.origin[0] + (idx.col as f64 + 0.5) * self.cell_size[0],
            self.origin[1] + (idx.row as f64 + 0.5) * self.cell_size[1],
        )
    }

    #[inline]
    pub fn contains(&self, idx: CellIndex) -> bool {
        idx.row < self.rows && idx.col < self.cols
    }

    #[inline]
    pub fn linear(&self, idx: CellIndex) -> usize {
        idx.row * self.cols + idx.col
    }

    #[inline]
    pub fn index_of(&self, linear: usize) -> CellIndex {
        CellIndex::new(linear / self.cols, linear % self.cols)
    }
}
