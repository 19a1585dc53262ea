use terrain_classifier::config::{parse_cli, RuntimeConfig};
use terrain_classifier::diagnostics::ProcessingReport;
use terrain_classifier::evaluation::{evaluate, GroundTruth};
use terrain_classifier::io::{read_xyz, save_label_image, write_json_file, write_label_dump};
use terrain_classifier::TerrainProcessor;
use std::env;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> terrain_classifier::Result<()> {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "terrain_demo".to_string());
    let config = parse_cli(&program)?;

    let points = read_xyz(&config.input_path)?;
    println!(
        "Loaded {} points from {}",
        points.len(),
        config.input_path.display()
    );

    let mut processor = TerrainProcessor::new(config.params.clone())?;
    let report = processor.process(points);
    print_text_summary(&report);

    write_outputs(&config, &report)?;

    if let Some(path) = &config.ground_truth {
        let truth = GroundTruth::load(path)?;
        let score = evaluate(&report.result, &truth, config.beta)?;
        println!("\nEvaluation against {} polygons", truth.len());
        println!("  cells: {}", score.samples);
        println!("  homogeneity: {:.4}", score.homogeneity);
        println!("  completeness: {:.4}", score.completeness);
        println!("  v-measure (beta={}): {:.4}", score.beta, score.v_measure);
    }
    Ok(())
}

fn write_outputs(
    config: &RuntimeConfig,
    report: &ProcessingReport,
) -> terrain_classifier::Result<()> {
    let out = &config.output;
    if let Some(path) = &out.json_out {
        write_json_file(path, report)?;
        println!("\nJSON report written to {}", path.display());
    }
    if let Some(path) = &out.label_dump {
        write_label_dump(path, &report.result)?;
        println!("Label dump written to {}", path.display());
    }
    if let Some(path) = &out.label_image {
        save_label_image(path, &report.result, out.image_scale)?;
        println!("Label image written to {}", path.display());
    }
    Ok(())
}

fn print_text_summary(report: &ProcessingReport) {
    let res = &report.result;
    let trace = &report.trace;
    println!("Classification summary");
    println!("  valid: {}", res.valid);
    println!("  stage: {}", res.stage);
    println!("  labels: {}", res.num_labels);
    println!(
        "  labelled cells: {} / {}",
        res.labelled_count(),
        res.labels.len()
    );
    println!("  latency_ms: {:.3}", res.latency_ms);
    if let Some(log_z) = res.log_partition {
        println!("  log partition: {:.4}", log_z);
    }

    if let Some(grid) = &trace.grid {
        println!(
            "\nGrid: accepted={} rejected(bounds={}, height={}) valid={} usable={}",
            grid.inserted.accepted,
            grid.inserted.rejected_bounds,
            grid.inserted.rejected_height,
            grid.valid_cells,
            grid.usable_cells
        );
    }
    if let Some(graph) = &trace.graph {
        println!("Graph: vertices={} edges={}", graph.vertices, graph.edges);
    }
    if let Some(seg) = &trace.segmentation {
        println!(
            "Segmentation: k={} components={} merges={}",
            seg.k, seg.components, seg.merges
        );
    }
    if let Some(mix) = &trace.mixture {
        println!(
            "Mixture: samples={} components={} active={} iterations={} converged={} loglik={:.4}",
            mix.samples,
            mix.components.len(),
            mix.active_components,
            mix.iterations,
            mix.converged,
            mix.log_likelihood
        );
    }
    for pass in &trace.smoothing {
        println!(
            "Smoothing pass {}: mode={:?} iterations={} converged={} delta={:.2e} logZ={:.4}",
            pass.pass,
            pass.mode,
            pass.iterations,
            pass.converged,
            pass.final_delta,
            pass.log_partition
        );
    }
    if let Some(labeling) = &trace.labeling {
        println!(
            "Labeling: source={:?} kept={:?} dropped={:?}",
            labeling.source, labeling.compaction.kept_labels, labeling.compaction.dropped_labels
        );
    }

    if !res.planes.is_empty() {
        println!("\nPlanes:");
        for plane in &res.planes {
            println!(
                "  label {} (component {}): z = {:.4} + {:.4}x + {:.4}y  \
                 var={:.3e} weight={:.3} cells={}",
                plane.label,
                plane.component,
                plane.coefficients[0],
                plane.coefficients[1],
                plane.coefficients[2],
                plane.variance,
                plane.weight,
                plane.cells
            );
        }
    }

    for failure in &trace.failures {
        println!(
            "\nFailure at {}: [{}] {} (recovered={})",
            failure.stage, failure.code, failure.message, failure.recovered
        );
    }

    println!("\nTimings: {}", trace.timings.summary());
}
