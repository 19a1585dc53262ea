use super::MixtureOptions;
use crate::dem::Dem;
use crate::error::Result;
use crate::graph::RegionGraph;
use crate::types::CellIndex;
use nalgebra::Point2;

/// Regression sample summarising one usable cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneSample {
    /// Graph vertex the sample came from.
    pub vertex: usize,
    pub cell: CellIndex,
    pub position: Point2<f64>,
    /// Mean height of the cell.
    pub height: f64,
    /// Population variance of the cell heights.
    pub variance: f64,
    pub weight: f64,
}

/// Samples in graph-vertex order plus the reverse vertex map.
#[derive(Clone, Debug, Default)]
pub struct SampleSet {
    samples: Vec<PlaneSample>,
    vertex_sample: Vec<Option<usize>>,
}

impl SampleSet {
    /// One sample per usable vertex of `graph`.
    pub fn from_dem(dem: &Dem, graph: &RegionGraph, options: &MixtureOptions) -> Result<Self> {
        let min_points = dem.min_points_per_plane();
        let mut samples = Vec::with_capacity(graph.vertex_count());
        let mut vertex_sample = vec![None; graph.vertex_count()];
        for (v, &idx) in graph.vertices().iter().enumerate() {
            let cell = dem.cell(idx)?;
            if !cell.is_usable(min_points) {
                continue;
            }
            vertex_sample[v] = Some(samples.len());
            samples.push(PlaneSample {
                vertex: v,
                cell: idx,
                position: cell.center(),
                height: cell.mean(),
                variance: cell.variance(),
                weight: if options.weight_by_count {
                    cell.count() as f64
                } else {
                    1.0
                },
            });
        }
        Ok(Self {
            samples,
            vertex_sample,
        })
    }

    pub fn from_samples(samples: Vec<PlaneSample>, vertex_count: usize) -> Self {
        let mut vertex_sample = vec![None; vertex_count];
        for (i, s) in samples.iter().enumerate() {
            if let Some(slot) = vertex_sample.get_mut(s.vertex) {
                *slot = Some(i);
            }
        }
        Self {
            samples,
            vertex_sample,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PlaneSample] {
        &self.samples
    }

    /// Sample index of graph vertex `v`, if the vertex was usable.
    pub fn sample_of(&self, v: usize) -> Option<usize> {
        self.vertex_sample.get(v).copied().flatten()
    }

    pub fn total_weight(&self) -> f64 {
        self.samples.iter().map(|s| s.weight).sum()
    }
}
