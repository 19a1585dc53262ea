#![allow(dead_code)]

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use terrain_classifier::dem::GridGeometry;

/// Square grid anchored at the origin.
pub fn square_grid(cells: usize, cell_size: f64) -> GridGeometry {
    GridGeometry {
        origin: [0.0, 0.0],
        cell_size: [cell_size, cell_size],
        rows: cells,
        cols: cells,
    }
}

/// Samples `surface` on a `per_cell` x `per_cell` sub-grid inside every cell,
/// adding `+sigma` / `-sigma` in a checkerboard pattern. With an even
/// `per_cell` each cell mean equals the surface at the cell centre for
/// planar surfaces and the noise variance is exactly `sigma²`.
pub fn sample_surface<F>(
    geometry: &GridGeometry,
    per_cell: usize,
    sigma: f64,
    surface: F,
) -> Vec<Point3<f64>>
where
    F: Fn(f64, f64) -> f64,
{
    assert!(per_cell > 0, "need at least one sample per cell");
    let [ox, oy] = geometry.origin;
    let [sx, sy] = geometry.cell_size;
    let nx = geometry.cols * per_cell;
    let ny = geometry.rows * per_cell;
    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let x = ox + (i as f64 + 0.5) * sx / per_cell as f64;
            let y = oy + (j as f64 + 0.5) * sy / per_cell as f64;
            let noise = if (i + j) % 2 == 0 { sigma } else { -sigma };
            points.push(Point3::new(x, y, surface(x, y) + noise));
        }
    }
    points
}

/// `per_cell` points at random positions inside every cell with Gaussian
/// height noise of standard deviation `sigma`; reproducible for a `seed`.
pub fn sample_surface_noisy<F>(
    geometry: &GridGeometry,
    per_cell: usize,
    sigma: f64,
    seed: u64,
    surface: F,
) -> Vec<Point3<f64>>
where
    F: Fn(f64, f64) -> f64,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).expect("finite, non-negative sigma");
    let [ox, oy] = geometry.origin;
    let [sx, sy] = geometry.cell_size;
    let mut points = Vec::with_capacity(geometry.rows * geometry.cols * per_cell);
    for row in 0..geometry.rows {
        for col in 0..geometry.cols {
            for _ in 0..per_cell {
                // Stay clear of cell borders so every point lands in its cell.
                let x = ox + (col as f64 + rng.random_range(0.05..0.95)) * sx;
                let y = oy + (row as f64 + rng.random_range(0.05..0.95)) * sy;
                points.push(Point3::new(x, y, surface(x, y) + noise.sample(&mut rng)));
            }
        }
    }
    points
}
