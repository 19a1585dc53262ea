use super::{PipelineStage, PipelineState, ProcessorParams};
use crate::dem::{Dem, DenseLabels, LabelCompaction};
use crate::diagnostics::{
    GraphStage, GridStage, InputDescriptor, LabelingSource, LabelingStage, MixtureStage,
    PipelineTrace, ProcessingReport, SegmentationStage, SmoothingStage, StageClock,
};
use crate::error::Result;
use crate::graph::{GraphSegmenter, RegionGraph};
use crate::mixture::{PlaneMixture, PlaneMixtureEstimator, SampleSet};
use crate::mrf::{PairwiseLabelSmoother, Smoothing};
use crate::types::{CellMarginal, PlaneSummary, TerrainResult};
use log::{debug, info, warn};
use nalgebra::{DMatrix, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Point cloud → DEM → region graph → segmentation → plane mixture →
/// smoothing → label map.
///
/// ```no_run
/// use terrain_classifier::{ProcessorParams, TerrainProcessor};
/// use nalgebra::Point3;
///
/// # fn main() -> terrain_classifier::Result<()> {
/// let mut processor = TerrainProcessor::new(ProcessorParams::default())?;
/// let points = vec![Point3::new(0.05, 0.05, 0.0); 3];
/// let report = processor.process(points);
/// println!("valid={} labels={}", report.result.valid, report.result.num_labels);
/// # Ok(())
/// # }
/// ```
pub struct TerrainProcessor {
    params: ProcessorParams,
    segmenter: GraphSegmenter,
    estimator: PlaneMixtureEstimator,
    smoother: PairwiseLabelSmoother,
    last_dem: Option<Dem>,
}

/// Labels chosen for the DEM plus the model they came from.
struct Labelling {
    source: LabelingSource,
    labels: LabelTable,
    mixture: Option<PlaneMixture>,
}

enum LabelTable {
    Hard(DenseLabels),
    Soft(Smoothing),
}

impl TerrainProcessor {
    pub fn new(params: ProcessorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            segmenter: GraphSegmenter::new(params.segmentation.k)?,
            estimator: PlaneMixtureEstimator::new(params.mixture.clone())?,
            smoother: PairwiseLabelSmoother::new(params.smoothing.clone())?,
            params,
            last_dem: None,
        })
    }

    pub fn params(&self) -> &ProcessorParams {
        &self.params
    }

    /// DEM built by the last run.
    pub fn dem(&self) -> Option<&Dem> {
        self.last_dem.as_ref()
    }

    /// Run the pipeline with a generator seeded from
    /// `smoothing.inference.seed`.
    pub fn process<I>(&mut self, points: I) -> ProcessingReport
    where
        I: IntoIterator<Item = Point3<f64>>,
    {
        let mut rng = StdRng::seed_from_u64(self.params.smoothing.inference.seed);
        self.process_with_rng(points, &mut rng)
    }

    /// Run the pipeline drawing the sweep order from `rng`. Failures are
    /// reported through the result's validity flag and the trace.
    pub fn process_with_rng<I, R>(&mut self, points: I, rng: &mut R) -> ProcessingReport
    where
        I: IntoIterator<Item = Point3<f64>>,
        R: Rng + ?Sized,
    {
        let mut clock = StageClock::start();
        let geometry = self.params.dem.geometry;
        let mut trace = PipelineTrace::new(InputDescriptor::new(0, &geometry));
        let mut state = PipelineState::default();
        let mut result = TerrainResult::empty(geometry);

        if let Err(err) = self.run(points, rng, &mut clock, &mut trace, &mut state, &mut result) {
            warn!("pipeline stopped at {}: {}", state.stage, err);
            trace.record_failure(state.stage, &err);
            state.invalidate();
        }

        trace.timings.total_ms = clock.total_ms();
        result.valid = state.valid;
        result.stage = state.stage;
        result.latency_ms = trace.timings.total_ms;
        info!(
            "TerrainProcessor stage={} valid={} labels={} labelled_cells={} {}",
            result.stage,
            result.valid,
            result.num_labels,
            result.labelled_count(),
            trace.timings.summary()
        );
        ProcessingReport { result, trace }
    }

    fn run<I, R>(
        &mut self,
        points: I,
        rng: &mut R,
        clock: &mut StageClock,
        trace: &mut PipelineTrace,
        state: &mut PipelineState,
        result: &mut TerrainResult,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Point3<f64>>,
        R: Rng + ?Sized,
    {
        self.last_dem = None;
        let mut dem = Dem::new(self.params.dem.clone())?;
        let inserted = dem.insert_points(points);
        trace.input.points = inserted.total();
        let ms = clock.lap(&mut trace.timings, "grid");
        trace.grid = Some(GridStage::new(&dem, inserted, ms));
        state.advance(PipelineStage::GridBuilt);
        if dem.valid_cells_count() == 0 {
            warn!("no point fell inside the grid and height filter");
            state.invalidate();
            self.last_dem = Some(dem);
            return Ok(());
        }

        let graph = RegionGraph::build(&dem);
        let ms = clock.lap(&mut trace.timings, "graph");
        trace.graph = Some(GraphStage::new(&graph, ms));
        state.advance(PipelineStage::GraphBuilt);

        let segmentation = self.segmenter.segment(&graph);
        let ms = clock.lap(&mut trace.timings, "segmentation");
        trace.segmentation = Some(SegmentationStage::new(
            &segmentation,
            self.segmenter.k(),
            ms,
        ));
        state.advance(PipelineStage::Segmented);

        let samples = SampleSet::from_dem(&dem, &graph, self.estimator.options())?;
        let fitted = self.estimator.fit(&samples, &segmentation);
        let ms = clock.lap(&mut trace.timings, "mixture");
        state.advance(PipelineStage::MixtureFit);
        let labelling = match fitted {
            Ok(mixture) => {
                trace.mixture = Some(MixtureStage::new(&mixture, &samples, ms));
                state.advance(PipelineStage::Smoothed);
                self.smooth(&dem, &graph, &samples, mixture, rng, clock, trace, state)?
            }
            Err(err) if err.is_recoverable() => {
                warn!("mixture fit degenerated, assigning a single label: {err}");
                trace.record_failure(PipelineStage::MixtureFit, &err);
                state.invalidate();
                let mut labels = DenseLabels::new(1);
                for &cell in graph.vertices() {
                    labels.push_hard(cell, 0);
                }
                Labelling {
                    source: LabelingSource::SingleLabel,
                    labels: LabelTable::Hard(labels),
                    mixture: None,
                }
            }
            Err(err) => return Err(err),
        };

        let compaction = match &labelling.labels {
            LabelTable::Hard(labels) => dem.set_label_assignment(labels)?,
            LabelTable::Soft(smoothing) => dem.set_label_assignment(smoothing)?,
        };
        clock.lap(&mut trace.timings, "labeling");
        fill_result(result, &dem, &labelling, &compaction)?;
        trace.labeling = Some(LabelingStage {
            source: labelling.source,
            compaction,
            labelled_cells: result.labelled_count(),
        });
        self.last_dem = Some(dem);
        Ok(())
    }

    /// Smoothing with optional outer refit passes. Inference failures fall
    /// back to the mixture posterior argmax.
    #[allow(clippy::too_many_arguments)]
    fn smooth<R: Rng + ?Sized>(
        &self,
        dem: &Dem,
        graph: &RegionGraph,
        samples: &SampleSet,
        mixture: PlaneMixture,
        rng: &mut R,
        clock: &mut StageClock,
        trace: &mut PipelineTrace,
        state: &mut PipelineState,
    ) -> Result<Labelling> {
        let order = self.params.smoothing.inference.order;
        let mut smoothing = match self.smoother.smooth(dem, graph, Some(&mixture), rng) {
            Ok(s) => s,
            Err(err) if err.is_recoverable() => {
                warn!("label smoothing failed, keeping the mixture labelling: {err}");
                trace.record_failure(PipelineStage::Smoothed, &err);
                state.invalidate();
                clock.lap(&mut trace.timings, "smoothing");
                return Ok(Labelling {
                    source: LabelingSource::MixtureFallback,
                    labels: LabelTable::Hard(mixture_labels(dem, graph, &mixture)?),
                    mixture: Some(mixture),
                });
            }
            Err(err) => return Err(err),
        };
        let ms = clock.lap(&mut trace.timings, "smoothing");
        trace.smoothing.push(SmoothingStage::new(&smoothing, order, 0, ms));

        let mut mixture = mixture;
        for pass in 1..self.params.outer_iterations {
            let resp = responsibilities_from(samples, &smoothing);
            let refit = match self.estimator.refit(samples, &resp) {
                Ok(m) => m,
                Err(err) => {
                    warn!(
                        "outer pass {pass}: mixture refit failed, keeping previous labelling: {err}"
                    );
                    trace.record_failure(PipelineStage::MixtureFit, &err);
                    break;
                }
            };
            let next = match self.smoother.smooth(dem, graph, Some(&refit), rng) {
                Ok(s) => s,
                Err(err) => {
                    warn!("outer pass {pass}: smoothing failed, keeping previous labelling: {err}");
                    trace.record_failure(PipelineStage::Smoothed, &err);
                    break;
                }
            };
            let ms = clock.lap(&mut trace.timings, "outer");
            trace.smoothing.push(SmoothingStage::new(&next, order, pass, ms));
            let change = (next.log_partition - smoothing.log_partition).abs();
            debug!(
                "outer pass {pass}: log_z {:.6} -> {:.6}",
                smoothing.log_partition, next.log_partition
            );
            trace.mixture = Some(MixtureStage::new(&refit, samples, ms));
            mixture = refit;
            smoothing = next;
            if change < self.params.outer_tolerance {
                break;
            }
        }
        Ok(Labelling {
            source: LabelingSource::Smoothing,
            labels: LabelTable::Soft(smoothing),
            mixture: Some(mixture),
        })
    }
}

/// Hard labels from the mixture posterior of every graph vertex.
fn mixture_labels(dem: &Dem, graph: &RegionGraph, mixture: &PlaneMixture) -> Result<DenseLabels> {
    let mut labels = DenseLabels::new(mixture.len());
    for &idx in graph.vertices() {
        let cell = dem.cell(idx)?;
        labels.push_hard(idx, mixture.classify(cell.center(), cell.mean()));
    }
    Ok(labels)
}

/// Marginals of the sampled vertices as a responsibility matrix.
fn responsibilities_from(samples: &SampleSet, smoothing: &Smoothing) -> DMatrix<f64> {
    let mut resp = DMatrix::zeros(samples.len(), smoothing.label_count);
    for (i, s) in samples.samples().iter().enumerate() {
        for (k, p) in smoothing.marginals[s.vertex].iter().enumerate() {
            resp[(i, k)] = *p;
        }
    }
    resp
}

fn fill_result(
    result: &mut TerrainResult,
    dem: &Dem,
    labelling: &Labelling,
    compaction: &LabelCompaction,
) -> Result<()> {
    result.labels = dem.label_map()?;
    result.num_labels = dem.num_labels();
    result.planes = match &labelling.mixture {
        Some(mixture) => compaction
            .kept_labels
            .iter()
            .zip(&compaction.support)
            .enumerate()
            .filter_map(|(label, (&component, &cells))| {
                let plane = mixture.components.get(component)?;
                Some(PlaneSummary {
                    label,
                    component,
                    coefficients: plane.coefficients_array(),
                    variance: plane.variance,
                    weight: plane.weight,
                    cells,
                })
            })
            .collect(),
        None => Vec::new(),
    };
    if let LabelTable::Soft(smoothing) = &labelling.labels {
        result.log_partition = Some(smoothing.log_partition);
        result.marginals = Some(
            dem.valid_cells()
                .filter_map(|(cell, c)| {
                    c.label_distribution().map(|d| CellMarginal {
                        cell,
                        distribution: d.to_vec(),
                    })
                })
                .collect(),
        );
    }
    Ok(())
}
