mod common;

use approx::assert_relative_eq;
use common::synthetic_cloud::{sample_surface, sample_surface_noisy, square_grid};
use nalgebra::Point3;
use terrain_classifier::dem::DemOptions;
use terrain_classifier::diagnostics::LabelingSource;
use terrain_classifier::{PipelineStage, ProcessorParams, TerrainProcessor, TerrainResult};

const SIGMA: f64 = 0.01;

/// Segmentation scale at which 20 noisy points per cell merge a flat plane
/// into one component: noise-only KL weights stay far below `k / 400`, while
/// the 0.5 m step weight (about 2500) stays above `k / 200`.
const COARSE_K: f64 = 1e4;

fn step(x: f64, _y: f64) -> f64 {
    if x < 1.0 {
        0.0
    } else {
        0.5
    }
}

fn params_with(cells: usize) -> ProcessorParams {
    ProcessorParams {
        dem: DemOptions::default().with_geometry(square_grid(cells, 0.1)),
        ..ProcessorParams::default()
    }
}

fn assert_step_split(result: &TerrainResult) {
    let low = result.label_at(0, 0).unwrap();
    let high = result.label_at(0, 19).unwrap();
    assert_ne!(low, high);
    for row in 0..20 {
        for col in 0..20 {
            let expected = if col < 10 { low } else { high };
            assert_eq!(result.label_at(row, col), Some(expected), "cell ({row}, {col})");
        }
    }
}

fn processor(cells: usize) -> TerrainProcessor {
    TerrainProcessor::new(params_with(cells)).expect("default parameters are valid")
}

#[test]
fn flat_plane_yields_single_label() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    let points = sample_surface(&geometry, 4, SIGMA, |_, _| 2.0);

    let mut processor = processor(20);
    let report = processor.process(points);
    let result = &report.result;

    assert!(result.valid, "failures: {:?}", report.trace.failures);
    assert_eq!(result.stage, PipelineStage::Smoothed);
    assert_eq!(result.num_labels, 1);
    assert_eq!(result.labelled_count(), 400);
    assert!(result.labels.iter().all(|l| *l == Some(0)));

    let segmentation = report.trace.segmentation.as_ref().unwrap();
    assert_eq!(segmentation.components, 1);

    assert_eq!(result.planes.len(), 1);
    let plane = &result.planes[0];
    assert_relative_eq!(plane.coefficients[0], 2.0, epsilon = 1e-6);
    assert_relative_eq!(plane.coefficients[1], 0.0, epsilon = 1e-6);
    assert_relative_eq!(plane.coefficients[2], 0.0, epsilon = 1e-6);
    assert_relative_eq!(plane.variance, SIGMA * SIGMA, max_relative = 1e-3);
    assert_eq!(plane.cells, 400);
}

#[test]
fn sloped_plane_recovers_coefficients() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    let points = sample_surface(&geometry, 4, 0.02, |x, y| 0.5 + 0.2 * x - 0.1 * y);

    // Neighbouring cell means differ by the slope, so the merge threshold must
    // absorb that drift.
    let mut params = params_with(20);
    params.segmentation.k = 100.0;
    let mut processor = TerrainProcessor::new(params).unwrap();
    let report = processor.process(points);
    let result = &report.result;

    assert!(result.valid, "failures: {:?}", report.trace.failures);
    assert_eq!(report.trace.segmentation.as_ref().unwrap().components, 1);
    assert_eq!(result.num_labels, 1);
    let plane = &result.planes[0];
    assert_relative_eq!(plane.coefficients[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(plane.coefficients[1], 0.2, epsilon = 1e-6);
    assert_relative_eq!(plane.coefficients[2], -0.1, epsilon = 1e-6);
}

#[test]
fn height_step_splits_labels() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    let points = sample_surface(&geometry, 4, SIGMA, step);

    let mut processor = processor(20);
    let report = processor.process(points);
    let result = &report.result;

    assert!(result.valid, "failures: {:?}", report.trace.failures);
    assert!(report.trace.segmentation.as_ref().unwrap().components >= 2);
    assert_eq!(result.num_labels, 2);
    assert_eq!(
        report.trace.labeling.as_ref().unwrap().source,
        LabelingSource::Smoothing
    );

    assert_step_split(result);
    let low = result.label_at(0, 0).unwrap();
    let high = result.label_at(0, 19).unwrap();

    let low_plane = result.planes.iter().find(|p| p.label == low).unwrap();
    let high_plane = result.planes.iter().find(|p| p.label == high).unwrap();
    assert_relative_eq!(low_plane.coefficients[0], 0.0, epsilon = 1e-3);
    assert_relative_eq!(high_plane.coefficients[0], 0.5, epsilon = 1e-3);
    assert_eq!(low_plane.cells, 200);
    assert_eq!(high_plane.cells, 200);

    let marginals = result.marginals.as_ref().unwrap();
    assert_eq!(marginals.len(), 400);
    for m in marginals {
        assert_relative_eq!(m.distribution.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }
    assert!(result.log_partition.is_some());
}

#[test]
fn same_seed_gives_same_labels() {
    let geometry = square_grid(12, 0.1);
    let points = sample_surface(&geometry, 2, SIGMA, |x, y| if x + y < 1.2 { 0.0 } else { 0.3 });

    let first = processor(12).process(points.clone());
    let second = processor(12).process(points);
    assert_eq!(first.result.labels, second.result.labels);
    assert_eq!(first.result.log_partition, second.result.log_partition);
}

#[test]
fn empty_cloud_stops_after_grid() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut processor = processor(10);
    let report = processor.process(Vec::<Point3<f64>>::new());

    assert!(!report.result.valid);
    assert_eq!(report.result.stage, PipelineStage::GridBuilt);
    assert_eq!(report.result.labelled_count(), 0);
    assert!(report.trace.graph.is_none());
    assert!(processor.dem().is_some());
}

#[test]
fn points_outside_filters_are_rejected() {
    let mut processor = processor(10);
    let points = vec![
        Point3::new(-0.5, 0.5, 0.0),
        Point3::new(0.5, 0.5, 50.0),
        Point3::new(0.5, 0.5, f64::NAN),
    ];
    let report = processor.process(points);

    let grid = report.trace.grid.as_ref().unwrap();
    assert_eq!(grid.inserted.accepted, 0);
    assert_eq!(grid.inserted.total(), 3);
    assert!(!report.result.valid);
    assert_eq!(report.result.stage, PipelineStage::GridBuilt);
}

#[test]
fn report_serializes_to_json() {
    let geometry = square_grid(8, 0.1);
    let points = sample_surface(&geometry, 2, SIGMA, |_, _| 1.0);
    let report = processor(8).process(points);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["result"]["stage"], "smoothed");
    assert!(json["trace"]["timings"]["stages"].is_array());
    assert!(json["trace"]["grid"]["validCells"].is_number());
}

#[test]
fn noisy_flat_plane_merges_only_at_coarse_scale() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    let points = sample_surface_noisy(&geometry, 20, SIGMA, 7, |_, _| 2.0);

    // Noise alone produces nonzero KL weights, so the default scale keeps
    // several components.
    let fine = processor(20).process(points.clone());
    assert!(fine.trace.segmentation.as_ref().unwrap().components > 1);

    let mut params = params_with(20);
    params.segmentation.k = COARSE_K;
    let report = TerrainProcessor::new(params).unwrap().process(points);
    let result = &report.result;

    assert!(result.valid, "failures: {:?}", report.trace.failures);
    assert_eq!(report.trace.segmentation.as_ref().unwrap().components, 1);
    assert_eq!(result.num_labels, 1);
    assert_eq!(result.labelled_count(), 400);
    let plane = &result.planes[0];
    assert_relative_eq!(plane.coefficients[0], 2.0, epsilon = 1e-3);
    assert_relative_eq!(plane.coefficients[1], 0.0, epsilon = 1e-3);
    assert_relative_eq!(plane.coefficients[2], 0.0, epsilon = 1e-3);
    assert_relative_eq!(plane.variance, SIGMA * SIGMA, max_relative = 0.1);
}

#[test]
fn noisy_height_step_splits_at_coarse_scale() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    for seed in [1, 2, 3] {
        let points = sample_surface_noisy(&geometry, 20, SIGMA, seed, step);
        let mut params = params_with(20);
        params.segmentation.k = COARSE_K;
        let report = TerrainProcessor::new(params).unwrap().process(points);

        assert!(report.result.valid, "seed {seed}: {:?}", report.trace.failures);
        assert_eq!(report.trace.segmentation.as_ref().unwrap().components, 2);
        assert_eq!(report.result.num_labels, 2);
        assert_step_split(&report.result);
    }
}

#[test]
fn degenerate_mixture_falls_back_to_single_label() {
    let _ = env_logger::builder().is_test(true).try_init();
    // One point per cell: no cell reaches min_points_per_plane, so no plane
    // can be fitted.
    let geometry = square_grid(20, 0.1);
    let points = sample_surface(&geometry, 1, SIGMA, step);
    let report = processor(20).process(points);
    let result = &report.result;

    assert!(!result.valid);
    assert_eq!(result.stage, PipelineStage::MixtureFit);
    assert_eq!(result.num_labels, 1);
    assert_eq!(result.labelled_count(), 400);
    assert!(result.planes.is_empty());
    assert!(result.log_partition.is_none());
    assert_eq!(
        report.trace.labeling.as_ref().unwrap().source,
        LabelingSource::SingleLabel
    );
    assert_eq!(report.trace.failures.len(), 1);
    assert_eq!(report.trace.failures[0].stage, PipelineStage::MixtureFit);
    assert_eq!(report.trace.failures[0].code, "NUMERIC_DEGENERACY");
    assert!(report.trace.failures[0].recovered);
}

#[test]
fn inference_failure_keeps_mixture_labels() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    let points = sample_surface(&geometry, 4, SIGMA, step);
    let mut params = params_with(20);
    params.smoothing.inference.max_iterations = 1;
    params.smoothing.inference.require_convergence = true;
    let report = TerrainProcessor::new(params).unwrap().process(points);
    let result = &report.result;

    assert!(!result.valid);
    assert_eq!(result.stage, PipelineStage::Smoothed);
    assert_eq!(
        report.trace.labeling.as_ref().unwrap().source,
        LabelingSource::MixtureFallback
    );
    assert!(report.trace.smoothing.is_empty());
    assert!(result.log_partition.is_none());
    assert_eq!(report.trace.failures.len(), 1);
    assert_eq!(report.trace.failures[0].stage, PipelineStage::Smoothed);
    assert_eq!(result.num_labels, 2);
    assert_step_split(result);
}

#[test]
fn outer_loop_records_every_pass() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = square_grid(20, 0.1);
    let points = sample_surface(&geometry, 4, SIGMA, step);
    let mut params = params_with(20);
    params.outer_iterations = 4;
    params.outer_tolerance = 0.0;
    let report = TerrainProcessor::new(params).unwrap().process(points);

    assert!(report.result.valid, "failures: {:?}", report.trace.failures);
    let passes: Vec<usize> = report.trace.smoothing.iter().map(|s| s.pass).collect();
    assert_eq!(passes, vec![0, 1, 2, 3]);
    assert_eq!(report.trace.final_log_partition(), report.result.log_partition);
    assert_step_split(&report.result);
}
