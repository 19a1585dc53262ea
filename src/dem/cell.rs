use crate::error::{Result, TerrainError};
use crate::stats::{argmax, HeightDistribution, OnlineMoments};
use nalgebra::{Point2, Vector2};
use std::cell::OnceCell;

/// One DEM square: running height statistics plus the current label state.
#[derive(Clone, Debug)]
pub struct Cell {
    height: OnlineMoments,
    center: Point2<f64>,
    size: Vector2<f64>,
    valid: bool,
    label_dist: Vec<f64>,
    map_label: OnceCell<usize>,
}

impl Cell {
    pub fn new(center: Point2<f64>, size: Vector2<f64>) -> Result<Self> {
        if !(size.x > 0.0 && size.y > 0.0) {
            return Err(TerrainError::config(format!(
                "cell size must be positive, got ({}, {})",
                size.x, size.y
            )));
        }
        Ok(Self {
            height: OnlineMoments::new(),
            center,
            size,
            valid: false,
            label_dist: Vec::new(),
            map_label: OnceCell::new(),
        })
    }

    /// Add one height sample; the cell becomes valid.
    #[inline]
    pub fn insert(&mut self, z: f64) {
        self.height.push(z);
        self.valid = true;
    }

    /// Fold in the samples of another cell covering the same square.
    pub fn merge(&mut self, other: &Cell) {
        if other.is_valid() {
            self.height.merge(&other.height);
            self.valid = true;
        }
    }

    pub fn height(&self) -> &OnlineMoments {
        &self.height
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.height.count()
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.height.mean()
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.height.variance()
    }

    pub fn distribution(&self, variance_floor: f64) -> HeightDistribution {
        HeightDistribution::from_moments(&self.height, variance_floor)
    }

    pub fn center(&self) -> Point2<f64> {
        self.center
    }

    pub fn size(&self) -> Vector2<f64> {
        self.size
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Valid and backed by at least `min_points` samples.
    #[inline]
    pub fn is_usable(&self, min_points: usize) -> bool {
        self.valid && self.height.count() >= min_points as u64
    }

    pub fn label_distribution(&self) -> Option<&[f64]> {
        (!self.label_dist.is_empty()).then_some(self.label_dist.as_slice())
    }

    /// Replace the label distribution, checking that it is a probability
    /// vector within `tolerance`.
    pub fn set_label_distribution(&mut self, dist: Vec<f64>, tolerance: f64) -> Result<()> {
        if dist.is_empty() {
            return Err(TerrainError::invalid("label distribution is empty"));
        }
        if dist.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(TerrainError::invalid(format!(
                "label distribution has negative or non-finite entries: {:?}",
                dist
            )));
        }
        let sum: f64 = dist.iter().sum();
        if (sum - 1.0).abs() > tolerance {
            return Err(TerrainError::invalid(format!(
                "label distribution sums to {sum}, expected 1"
            )));
        }
        self.label_dist = dist;
        self.map_label = OnceCell::new();
        Ok(())
    }

    pub fn clear_labels(&mut self) {
        self.label_dist.clear();
        self.map_label = OnceCell::new();
    }

    /// Most probable label, cached until the distribution changes.
    pub fn map_label(&self) -> Option<usize> {
        if self.label_dist.is_empty() {
            return None;
        }
        Some(*self.map_label.get_or_init(|| argmax(&self.label_dist)))
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
        self.clear_labels();
    }

    pub fn reset(&mut self) {
        self.height.reset();
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cell() -> Cell {
        Cell::new(Point2::new(0.05, 0.05), Vector2::new(0.1, 0.1)).unwrap()
    }

    #[test]
    fn rejects_non_positive_size() {
        assert!(Cell::new(Point2::origin(), Vector2::new(0.0, 0.1)).is_err());
        assert!(Cell::new(Point2::origin(), Vector2::new(0.1, -1.0)).is_err());
    }

    #[test]
    fn becomes_valid_after_first_sample() {
        let mut cell = unit_cell();
        assert!(!cell.is_valid());
        cell.insert(1.0);
        assert!(cell.is_valid());
        assert!(!cell.is_usable(3));
        cell.insert(1.1);
        cell.insert(0.9);
        assert!(cell.is_usable(3));
    }

    #[test]
    fn map_label_tracks_distribution_updates() {
        let mut cell = unit_cell();
        cell.insert(0.0);
        assert_eq!(cell.map_label(), None);
        cell.set_label_distribution(vec![0.2, 0.7, 0.1], 1e-6).unwrap();
        assert_eq!(cell.map_label(), Some(1));
        cell.set_label_distribution(vec![0.6, 0.3, 0.1], 1e-6).unwrap();
        assert_eq!(cell.map_label(), Some(0));
        cell.clear_labels();
        assert_eq!(cell.map_label(), None);
    }

    #[test]
    fn rejects_distribution_that_does_not_sum_to_one() {
        let mut cell = unit_cell();
        assert!(cell.set_label_distribution(vec![0.5, 0.4], 1e-6).is_err());
        assert!(cell.set_label_distribution(vec![1.5, -0.5], 1e-6).is_err());
        assert!(cell.set_label_distribution(Vec::new(), 1e-6).is_err());
        assert!(cell.label_distribution().is_none());
    }
}
