use nalgebra::Point3;
use terrain_classifier::dem::{DemOptions, GridGeometry};
use terrain_classifier::{ProcessorParams, TerrainProcessor};

fn main() {
    // Demo: a 4 x 4 m patch, flat at z = 0 on the left and raised by 0.5 m on
    // the right, sampled on a regular sub-grid.
    let geometry = match GridGeometry::from_extent([0.0, 0.0], [4.0, 4.0], [0.2, 0.2]) {
        Ok(g) => g,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    let mut points = Vec::new();
    let steps = 80;
    for i in 0..steps {
        for j in 0..steps {
            let x = (i as f64 + 0.5) * 4.0 / steps as f64;
            let y = (j as f64 + 0.5) * 4.0 / steps as f64;
            let noise = if (i + j) % 2 == 0 { 0.01 } else { -0.01 };
            let z = if x < 2.0 { 0.0 } else { 0.5 } + noise;
            points.push(Point3::new(x, y, z));
        }
    }

    let params = ProcessorParams {
        dem: DemOptions::default().with_geometry(geometry),
        ..ProcessorParams::default()
    };
    let mut processor = match TerrainProcessor::new(params) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    let report = processor.process(points);
    let res = &report.result;
    println!(
        "valid={} stage={} labels={} latency_ms={:.3}",
        res.valid, res.stage, res.num_labels, res.latency_ms
    );
    for plane in &res.planes {
        println!(
            "  label {}: z = {:.3} + {:.3}x + {:.3}y  var={:.2e} cells={}",
            plane.label,
            plane.coefficients[0],
            plane.coefficients[1],
            plane.coefficients[2],
            plane.variance,
            plane.cells
        );
    }
}
