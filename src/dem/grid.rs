use super::{Cell, DemOptions, GridGeometry};
use crate::error::{Result, TerrainError};
use crate::stats::argmax;
use crate::types::CellIndex;
use log::debug;
use nalgebra::{Point2, Point3, Vector2};
use serde::Serialize;

/// Tolerance on `Σp = 1` when label distributions are assigned.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Per-cell label distributions produced outside the grid (e.g. by the
/// smoother), addressed by position `0..cell_count()`.
pub trait LabelSource {
    fn cell_count(&self) -> usize;
    fn label_count(&self) -> usize;
    fn cell(&self, i: usize) -> CellIndex;
    fn distribution(&self, i: usize) -> &[f64];
}

/// Plain owned [`LabelSource`].
#[derive(Clone, Debug, Default)]
pub struct DenseLabels {
    pub label_count: usize,
    pub cells: Vec<CellIndex>,
    pub distributions: Vec<Vec<f64>>,
}

impl DenseLabels {
    pub fn new(label_count: usize) -> Self {
        Self {
            label_count,
            ..Default::default()
        }
    }

    pub fn push(&mut self, cell: CellIndex, distribution: Vec<f64>) {
        self.cells.push(cell);
        self.distributions.push(distribution);
    }

    /// Put all the mass on `label`.
    pub fn push_hard(&mut self, cell: CellIndex, label: usize) {
        let mut dist = vec![0.0; self.label_count];
        if let Some(p) = dist.get_mut(label) {
            *p = 1.0;
        }
        self.push(cell, dist);
    }
}

impl LabelSource for DenseLabels {
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
        &self.distributions[i]
    }
}

/// Outcome of a label assignment.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCompaction {
    /// Original label id of every surviving (renumbered) label.
    pub kept_labels: Vec<usize>,
    /// Number of cells whose MAP label is each surviving label.
    pub support: Vec<usize>,
    pub dropped_labels: usize,
    pub invalidated_cells: usize,
}

/// Counters returned by [`Dem::insert_points`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertStats {
    pub accepted: usize,
    pub rejected_bounds: usize,
    pub rejected_height: usize,
}

impl InsertStats {
    pub fn total(&self) -> usize {
        self.accepted + self.rejected_bounds + self.rejected_height
    }
}

enum Placement {
    Cell(usize),
    OutOfBounds,
    OutOfHeight,
}

/// Digital elevation map: a row-major grid of [`Cell`]s.
#[derive(Clone, Debug)]
pub struct Dem {
    options: DemOptions,
    cells: Vec<Cell>,
    valid_cells: usize,
    num_labels: usize,
    labelled: bool,
}

impl Dem {
    pub fn new(options: DemOptions) -> Result<Self> {
        options.validate()?;
        let g = options.geometry;
        let size = Vector2::new(g.cell_size[0], g.cell_size[1]);
        let cells = (0..g.cell_count())
            .map(|i| Cell::new(g.center(g.index_of(i)), size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            options,
            cells,
            valid_cells: 0,
            num_labels: 0,
            labelled: false,
        })
    }

    pub fn options(&self) -> &DemOptions {
        &self.options
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.options.geometry
    }

    pub fn rows(&self) -> usize {
        self.options.geometry.rows
    }

    pub fn cols(&self) -> usize {
        self.options.geometry.cols
    }

    pub fn min_points_per_plane(&self) -> usize {
        self.options.min_points_per_plane
    }

    pub fn variance_floor(&self) -> f64 {
        self.options.variance_floor
    }

    fn place(&self, x: f64, y: f64, z: f64) -> Placement {
        let Some(idx) = self.options.geometry.locate(x, y) else {
            return Placement::OutOfBounds;
        };
        if !(z >= self.options.min_height && z <= self.options.max_height) {
            return Placement::OutOfHeight;
        }
        Placement::Cell(self.options.geometry.linear(idx))
    }

    fn insert_at(&mut self, linear: usize, z: f64) {
        let cell = &mut self.cells[linear];
        if !cell.is_valid() {
            self.valid_cells += 1;
        }
        cell.insert(z);
    }

    /// Fold the cell statistics of `other` into this grid, e.g. when a cloud
    /// is binned tile by tile. Both grids must share geometry and neither may
    /// carry labels yet.
    pub fn merge(&mut self, other: &Dem) -> Result<()> {
        if self.options.geometry != other.options.geometry {
            return Err(TerrainError::config(
                "cannot merge DEMs with different geometry",
            ));
        }
        if self.labelled || other.labelled {
            return Err(TerrainError::invalid("cannot merge labelled DEMs"));
        }
        for (cell, theirs) in self.cells.iter_mut().zip(&other.cells) {
            if theirs.is_valid() && !cell.is_valid() {
                self.valid_cells += 1;
            }
            cell.merge(theirs);
        }
        debug!("Dem::merge valid_cells={}", self.valid_cells);
        Ok(())
    }

    /// Route one point to its cell. Returns `false` when the point falls
    /// outside the grid or the height filter.
    pub fn insert_point(&mut self, x: f64, y: f64, z: f64) -> bool {
        match self.place(x, y, z) {
            Placement::Cell(linear) => {
                self.insert_at(linear, z);
                true
            }
            _ => false,
        }
    }

    pub fn insert_points<I>(&mut self, points: I) -> InsertStats
    where
        I: IntoIterator<Item = Point3<f64>>,
    {
        let mut stats = InsertStats::default();
        for p in points {
            match self.place(p.x, p.y, p.z) {
                Placement::Cell(linear) => {
                    self.insert_at(linear, p.z);
                    stats.accepted += 1;
                }
                Placement::OutOfBounds => stats.rejected_bounds += 1,
                Placement::OutOfHeight => stats.rejected_height += 1,
            }
        }
        debug!(
            "Dem::insert_points accepted={} rejected_bounds={} rejected_height={} valid_cells={}",
            stats.accepted, stats.rejected_bounds, stats.rejected_height, self.valid_cells
        );
        stats
    }

    fn checked_linear(&self, row: usize, col: usize) -> Result<usize> {
        let g = &self.options.geometry;
        if row >= g.rows {
            return Err(TerrainError::out_of_range("row", row, g.rows));
        }
        if col >= g.cols {
            return Err(TerrainError::out_of_range("column", col, g.cols));
        }
        Ok(g.linear(CellIndex::new(row, col)))
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Result<&Cell> {
        let i = self.checked_linear(row, col)?;
        Ok(&self.cells[i])
    }

    pub fn cell_at_mut(&mut self, row: usize, col: usize) -> Result<&mut Cell> {
        let i = self.checked_linear(row, col)?;
        Ok(&mut self.cells[i])
    }

    pub fn cell(&self, idx: CellIndex) -> Result<&Cell> {
        self.cell_at(idx.row, idx.col)
    }

    pub fn locate(&self, x: f64, y: f64) -> Option<CellIndex> {
        self.options.geometry.locate(x, y)
    }

    pub fn cell_center(&self, idx: CellIndex) -> Result<Point2<f64>> {
        self.checked_linear(idx.row, idx.col)?;
        Ok(self.options.geometry.center(idx))
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn valid_cells_count(&self) -> usize {
        self.valid_cells
    }

    pub fn usable_cells_count(&self) -> usize {
        let min_points = self.options.min_points_per_plane;
        self.cells.iter().filter(|c| c.is_usable(min_points)).count()
    }

    /// Valid cells in row-major order.
    pub fn valid_cells(&self) -> impl Iterator<Item = (CellIndex, &Cell)> + '_ {
        let g = self.options.geometry;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_valid())
            .map(move |(i, c)| (g.index_of(i), c))
    }

    /// Labels in use after the last assignment.
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn is_labelled(&self) -> bool {
        self.labelled
    }

    /// Rewrite the label distribution of every valid cell from `source`.
    ///
    /// The source must cover each valid cell exactly once. Labels supported
    /// by fewer than `min_points_per_plane` cells are discarded and the
    /// remaining ones renumbered without gaps; cells whose MAP label was
    /// discarded become invalid.
    pub fn set_label_assignment<S>(&mut self, source: &S) -> Result<LabelCompaction>
    where
        S: LabelSource + ?Sized,
    {
        let n = source.cell_count();
        if n != self.valid_cells {
            return Err(TerrainError::invalid(format!(
                "label source covers {n} cells but the grid has {} valid cells",
                self.valid_cells
            )));
        }
        let labels = source.label_count();
        if labels == 0 {
            return Err(TerrainError::invalid("label source has no labels"));
        }

        let g = self.options.geometry;
        let mut seen = vec![false; self.cells.len()];
        let mut best = Vec::with_capacity(n);
        let mut support = vec![0usize; labels];
        for i in 0..n {
            let idx = source.cell(i);
            if !g.contains(idx) {
                return Err(TerrainError::out_of_range(
                    "cell",
                    g.linear(idx),
                    self.cells.len(),
                ));
            }
            let lin = g.linear(idx);
            if !self.cells[lin].is_valid() {
                return Err(TerrainError::invalid(format!(
                    "label source references invalid cell {:?}",
                    idx
                )));
            }
            if std::mem::replace(&mut seen[lin], true) {
                return Err(TerrainError::invalid(format!(
                    "label source lists cell {:?} twice",
                    idx
                )));
            }
            let dist = source.distribution(i);
            check_distribution(dist, labels)?;
            let label = argmax(dist);
            support[label] += 1;
            best.push(label);
        }

        let min_support = self.options.min_points_per_plane.max(1);
        let mut remap = vec![None; labels];
        let mut kept = Vec::new();
        for (label, &count) in support.iter().enumerate() {
            if count >= min_support {
                remap[label] = Some(kept.len());
                kept.push(label);
            }
        }

        let mut invalidated = 0usize;
        for (i, &label) in best.iter().enumerate() {
            let lin = g.linear(source.cell(i));
            if remap[label].is_none() {
                self.cells[lin].invalidate();
                invalidated += 1;
                continue;
            }
            let dist = source.distribution(i);
            let mut restricted: Vec<f64> = kept.iter().map(|&l| dist[l]).collect();
            let total: f64 = restricted.iter().sum();
            restricted.iter_mut().for_each(|p| *p /= total);
            self.cells[lin].set_label_distribution(restricted, PROBABILITY_TOLERANCE)?;
        }

        self.valid_cells -= invalidated;
        self.num_labels = kept.len();
        self.labelled = true;
        debug!(
            "Dem::set_label_assignment labels={} kept={} invalidated_cells={}",
            labels,
            kept.len(),
            invalidated
        );
        Ok(LabelCompaction {
            support: kept.iter().map(|&l| support[l]).collect(),
            dropped_labels: labels - kept.len(),
            kept_labels: kept,
            invalidated_cells: invalidated,
        })
    }

    /// Row-major MAP label per cell. Fails before any assignment.
    pub fn label_map(&self) -> Result<Vec<Option<usize>>> {
        if !self.labelled {
            return Err(TerrainError::invalid(
                "label map requested before any label assignment",
            ));
        }
        Ok(self
            .cells
            .iter()
            .map(|c| if c.is_valid() { c.map_label() } else { None })
            .collect())
    }

    pub fn label_distribution(&self, row: usize, col: usize) -> Result<Option<&[f64]>> {
        let cell = self.cell_at(row, col)?;
        if !self.labelled {
            return Err(TerrainError::invalid(
                "label distribution requested before any label assignment",
            ));
        }
        Ok(cell.label_distribution())
    }

    /// Reset every cell for a rebuild.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(Cell::reset);
        self.valid_cells = 0;
        self.num_labels = 0;
        self.labelled = false;
    }
}

fn check_distribution(dist: &[f64], labels: usize) -> Result<()> {
    if dist.len() != labels {
        return Err(TerrainError::invalid(format!(
            "distribution has {} entries, expected {labels}",
            dist.len()
        )));
    }
    if dist.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(TerrainError::invalid(
            "distribution has negative or non-finite entries",
        ));
    }
    let sum: f64 = dist.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(TerrainError::invalid(format!(
            "distribution sums to {sum}, expected 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_dem(min_points: usize) -> Dem {
        let options = DemOptions {
            geometry: GridGeometry {
                origin: [0.0, 0.0],
                cell_size: [1.0, 1.0],
                rows: 2,
                cols: 3,
            },
            min_points_per_plane: min_points,
            ..Default::default()
        };
        Dem::new(options).unwrap()
    }

    #[test]
    fn construction_validates_configuration() {
        let mut options = DemOptions::default();
        options.geometry.rows = 0;
        assert!(matches!(
            Dem::new(options),
            Err(TerrainError::Configuration(_))
        ));

        let mut options = DemOptions::default();
        options.geometry.cell_size = [-0.1, 0.1];
        assert!(matches!(
            Dem::new(options),
            Err(TerrainError::Configuration(_))
        ));

        let options = DemOptions::default().with_height_range(1.0, 1.0);
        assert!(matches!(
            Dem::new(options),
            Err(TerrainError::Configuration(_))
        ));
    }

    #[test]
    fn insertion_filters_bounds_and_height() {
        let mut dem = small_dem(1);
        assert!(dem.insert_point(0.5, 0.5, 1.0));
        assert!(!dem.insert_point(3.5, 0.5, 1.0));
        assert!(!dem.insert_point(0.5, 0.5, 50.0));
        let stats = dem.insert_points(vec![
            Point3::new(2.5, 1.5, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(1.5, 0.5, -20.0),
        ]);
        assert_eq!(
            stats,
            InsertStats {
                accepted: 1,
                rejected_bounds: 1,
                rejected_height: 1
            }
        );
        assert_eq!(dem.valid_cells_count(), 2);
        assert_eq!(dem.cell_at(0, 0).unwrap().count(), 1);
        assert_eq!(dem.cell_at(1, 2).unwrap().count(), 1);
    }

    #[test]
    fn cell_access_is_bounds_checked() {
        let dem = small_dem(1);
        assert!(dem.cell_at(1, 2).is_ok());
        assert!(matches!(
            dem.cell_at(2, 0),
            Err(TerrainError::OutOfRange { .. })
        ));
        assert!(matches!(
            dem.cell_at(0, 3),
            Err(TerrainError::OutOfRange { .. })
        ));
    }

    #[test]
    fn cell_statistics_do_not_depend_on_insertion_order() {
        let heights: Vec<f64> = (0..40).map(|i| 1.0 + ((i * 7) % 13) as f64 * 0.01).collect();
        let mut a = small_dem(1);
        let mut b = small_dem(1);
        for &z in &heights {
            a.insert_point(0.25, 0.75, z);
        }
        for &z in heights.iter().rev() {
            b.insert_point(0.75, 0.25, z);
        }
        let ca = a.cell_at(0, 0).unwrap();
        let cb = b.cell_at(0, 0).unwrap();
        assert_eq!(ca.count(), cb.count());
        assert_relative_eq!(ca.mean(), cb.mean(), epsilon = 1e-12);
        assert_relative_eq!(ca.variance(), cb.variance(), epsilon = 1e-12);
    }

    #[test]
    fn merging_tiles_matches_single_pass() {
        let points: Vec<Point3<f64>> = (0..60)
            .map(|i| Point3::new((i % 3) as f64 + 0.5, 0.5, 0.1 * (i % 7) as f64))
            .collect();
        let mut whole = small_dem(1);
        whole.insert_points(points.iter().copied());

        let (head, tail) = points.split_at(25);
        let mut left = small_dem(1);
        let mut right = small_dem(1);
        left.insert_points(head.iter().copied());
        right.insert_points(tail.iter().copied());
        left.merge(&right).unwrap();

        assert_eq!(left.valid_cells_count(), whole.valid_cells_count());
        for col in 0..3 {
            let (m, w) = (left.cell_at(0, col).unwrap(), whole.cell_at(0, col).unwrap());
            assert_eq!(m.count(), w.count());
            assert_relative_eq!(m.mean(), w.mean(), epsilon = 1e-12);
            assert_relative_eq!(m.variance(), w.variance(), epsilon = 1e-12);
        }

        let other = Dem::new(DemOptions::default()).unwrap();
        assert!(matches!(
            left.merge(&other),
            Err(TerrainError::Configuration(_))
        ));
    }

    #[test]
    fn label_map_requires_assignment() {
        let mut dem = small_dem(1);
        dem.insert_point(0.5, 0.5, 0.0);
        assert!(matches!(
            dem.label_map(),
            Err(TerrainError::InvalidOperation(_))
        ));
        assert!(dem.label_distribution(0, 0).is_err());
    }

    #[test]
    fn assignment_compacts_weakly_supported_labels() {
        let mut dem = small_dem(2);
        for col in 0..3 {
            for row in 0..2 {
                dem.insert_point(col as f64 + 0.5, row as f64 + 0.5, 0.0);
            }
        }
        assert_eq!(dem.valid_cells_count(), 6);

        // label 0: 3 cells, label 1: 0 cells, label 2: 2 cells, label 3: 1 cell
        let mut source = DenseLabels::new(4);
        source.push(CellIndex::new(0, 0), vec![0.7, 0.1, 0.1, 0.1]);
        source.push(CellIndex::new(0, 1), vec![0.6, 0.2, 0.2, 0.0]);
        source.push(CellIndex::new(0, 2), vec![0.5, 0.0, 0.0, 0.5]);
        source.push(CellIndex::new(1, 0), vec![0.1, 0.1, 0.8, 0.0]);
        source.push(CellIndex::new(1, 1), vec![0.2, 0.0, 0.6, 0.2]);
        source.push(CellIndex::new(1, 2), vec![0.1, 0.2, 0.1, 0.6]);

        let compaction = dem.set_label_assignment(&source).unwrap();
        assert_eq!(compaction.kept_labels, vec![0, 2]);
        assert_eq!(compaction.support, vec![3, 2]);
        assert_eq!(compaction.dropped_labels, 2);
        assert_eq!(compaction.invalidated_cells, 1);
        assert_eq!(dem.num_labels(), 2);
        assert_eq!(dem.valid_cells_count(), 5);

        let map = dem.label_map().unwrap();
        assert_eq!(map, vec![Some(0), Some(0), Some(0), Some(1), Some(1), None]);

        let dist = dem.label_distribution(0, 1).unwrap().unwrap();
        assert_relative_eq!(dist[0], 0.75, epsilon = 1e-12);
        assert_relative_eq!(dist[1], 0.25, epsilon = 1e-12);
        assert!(!dem.cell_at(1, 2).unwrap().is_valid());
    }

    #[test]
    fn assignment_rejects_inconsistent_sources() {
        let mut dem = small_dem(1);
        dem.insert_point(0.5, 0.5, 0.0);
        dem.insert_point(1.5, 0.5, 0.0);

        let mut short = DenseLabels::new(2);
        short.push(CellIndex::new(0, 0), vec![1.0, 0.0]);
        assert!(dem.set_label_assignment(&short).is_err());

        let mut duplicated = DenseLabels::new(2);
        duplicated.push(CellIndex::new(0, 0), vec![1.0, 0.0]);
        duplicated.push(CellIndex::new(0, 0), vec![1.0, 0.0]);
        assert!(dem.set_label_assignment(&duplicated).is_err());

        let mut unnormalised = DenseLabels::new(2);
        unnormalised.push(CellIndex::new(0, 0), vec![0.5, 0.4]);
        unnormalised.push(CellIndex::new(0, 1), vec![1.0, 0.0]);
        assert!(matches!(
            dem.set_label_assignment(&unnormalised),
            Err(TerrainError::InvalidOperation(_))
        ));
        assert!(!dem.is_labelled());
    }

    #[test]
    fn clear_resets_state() {
        let mut dem = small_dem(1);
        dem.insert_point(0.5, 0.5, 0.0);
        dem.clear();
        assert_eq!(dem.valid_cells_count(), 0);
        assert!(dem.valid_cells().next().is_none());
    }
}
