use super::{BeliefPropagation, InferenceMode, PairwiseMrf, SmoothingOptions};
use crate::dem::{Dem, LabelSource};
use crate::error::Result;
use crate::graph::RegionGraph;
use crate::mixture::PlaneMixture;
use crate::types::CellIndex;
use log::debug;
use rand::Rng;

/// Smoothed labelling of the graph vertices.
#[derive(Clone, Debug)]
pub struct Smoothing {
    pub mode: InferenceMode,
    pub cells: Vec<CellIndex>,
    pub label_count: usize,
    pub marginals: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub log_partition: f64,
    pub iterations: usize,
    pub converged: bool,
    pub final_delta: f64,
}

impl LabelSource for Smoothing {
    fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn label_count(&self) -> usize {
        self.label_count
    }

    fn cell(&self, i: usize) -> CellIndex {
        self.cells[i]
    }

    fn distribution(&self, i: usize) -> &[f64] {
        &self.marginals[i]
    }
}

/// Builds the pairwise MRF for a DEM and runs belief propagation on it.
#[derive(Clone, Debug, Default)]
pub struct PairwiseLabelSmoother {
    options: SmoothingOptions,
}

impl PairwiseLabelSmoother {
    pub fn new(options: SmoothingOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &SmoothingOptions {
        &self.options
    }

    /// Without a mixture the domain collapses to one label and no messages
    /// are passed.
    pub fn smooth<R: Rng + ?Sized>(
        &self,
        dem: &Dem,
        graph: &RegionGraph,
        mixture: Option<&PlaneMixture>,
        rng: &mut R,
    ) -> Result<Smoothing> {
        let mrf = PairwiseMrf::build(dem, graph, mixture, &self.options.prior)?;
        debug!(
            "PairwiseLabelSmoother vars={} edges={} domain={}",
            mrf.variable_count(),
            mrf.edge_count(),
            mrf.domain()
        );
        let result = BeliefPropagation::new(&mrf, &self.options.inference).run(rng)?;
        Ok(Smoothing {
            mode: result.mode,
            cells: mrf.cells().to_vec(),
            label_count: mrf.domain(),
            marginals: result.marginals,
            labels: result.labels,
            log_partition: result.log_partition,
            iterations: result.iterations,
            converged: result.converged,
            final_delta: result.final_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dem::{DemOptions, GridGeometry};
    use crate::graph::GraphSegmenter;
    use crate::mixture::{MixtureOptions, PlaneMixtureEstimator, SampleSet};
    use crate::mrf::InferenceOptions;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 6×6 cells of 1 m; columns below 3 at height 0, the rest at 1.
    fn step_dem() -> Dem {
        let geometry = GridGeometry {
            origin: [0.0, 0.0],
            cell_size: [1.0, 1.0],
            rows: 6,
            cols: 6,
        };
        let mut dem = Dem::new(DemOptions::default().with_geometry(geometry)).unwrap();
        for row in 0..6 {
            for col in 0..6 {
                let base = if col < 3 { 0.0 } else { 1.0 };
                for (dx, dz) in [(0.25, -0.01), (0.5, 0.01), (0.75, -0.01), (0.6, 0.01)] {
                    dem.insert_point(col as f64 + dx, row as f64 + dx, base + dz);
                }
            }
        }
        dem
    }

    #[test]
    fn without_mixture_every_cell_gets_label_zero() {
        let mut dem = step_dem();
        let graph = RegionGraph::build(&dem);
        let mut rng = StdRng::seed_from_u64(1);
        let smoothing = PairwiseLabelSmoother::default()
            .smooth(&dem, &graph, None, &mut rng)
            .unwrap();
        assert_eq!(smoothing.label_count, 1);
        assert_eq!(smoothing.iterations, 0);
        assert!(smoothing.labels.iter().all(|&l| l == 0));
        let compaction = dem.set_label_assignment(&smoothing).unwrap();
        assert_eq!(compaction.kept_labels, vec![0]);
        assert!(dem.label_map().unwrap().iter().all(|l| *l == Some(0)));
    }

    #[test]
    fn smoothing_separates_step_halves() {
        let dem = step_dem();
        let graph = RegionGraph::build(&dem);
        let segmentation = GraphSegmenter::new(10.0).unwrap().segment(&graph);
        assert_eq!(segmentation.len(), 2);
        let samples = SampleSet::from_dem(&dem, &graph, &MixtureOptions::default()).unwrap();
        let mixture = PlaneMixtureEstimator::default()
            .fit(&samples, &segmentation)
            .unwrap();

        for mode in [InferenceMode::SumProduct, InferenceMode::MaxProduct] {
            let smoother = PairwiseLabelSmoother::new(SmoothingOptions {
                inference: InferenceOptions {
                    mode,
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();
            let mut rng = StdRng::seed_from_u64(42);
            let smoothing = smoother
                .smooth(&dem, &graph, Some(&mixture), &mut rng)
                .unwrap();
            assert_eq!(smoothing.label_count, 2);
            for (i, cell) in smoothing.cells.iter().enumerate() {
                let expected = usize::from(cell.col >= 3);
                assert_eq!(smoothing.labels[i], expected, "{mode:?} {cell:?}");
                assert_relative_eq!(
                    smoothing.marginals[i].iter().sum::<f64>(),
                    1.0,
                    epsilon = 1e-6
                );
            }
        }
    }
}
