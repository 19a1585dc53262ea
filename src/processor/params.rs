use crate::dem::DemOptions;
use crate::error::{Result, TerrainError};
use crate::graph::GraphSegmenter;
use crate::mixture::MixtureOptions;
use crate::mrf::SmoothingOptions;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationParams {
    /// Merge tolerance scale; larger values favour larger components.
    pub k: f64,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self { k: 10.0 }
    }
}

/// Full parameter set of [`TerrainProcessor`](super::TerrainProcessor).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorParams {
    pub dem: DemOptions,
    pub segmentation: SegmentationParams,
    pub mixture: MixtureOptions,
    pub smoothing: SmoothingOptions,
    /// Smoothing passes; every pass after the first refits the mixture from
    /// the previous marginals.
    pub outer_iterations: usize,
    /// Stop the outer loop once the log-partition moves by less than this.
    pub outer_tolerance: f64,
}

impl Default for ProcessorParams {
    fn default() -> Self {
        Self {
            dem: DemOptions::default(),
            segmentation: SegmentationParams::default(),
            mixture: MixtureOptions::default(),
            smoothing: SmoothingOptions::default(),
            outer_iterations: 1,
            outer_tolerance: 1e-4,
        }
    }
}

impl ProcessorParams {
    pub fn validate(&self) -> Result<()> {
        self.dem.validate()?;
        GraphSegmenter::new(self.segmentation.k)?;
        self.mixture.validate()?;
        self.smoothing.validate()?;
        if self.outer_iterations == 0 {
            return Err(TerrainError::config("outer_iterations must be at least 1"));
        }
        if !(self.outer_tolerance >= 0.0) {
            return Err(TerrainError::config(format!(
                "outer_tolerance must be non-negative, got {}",
                self.outer_tolerance
            )));
        }
        Ok(())
    }
}
