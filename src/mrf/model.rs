use super::{PairwiseFactor, SmoothnessPrior};
use crate::dem::Dem;
use crate::error::{Result, TerrainError};
use crate::graph::RegionGraph;
use crate::mixture::PlaneMixture;
use crate::stats::HeightDistribution;
use crate::types::CellIndex;

/// Pairwise MRF over the region graph: one discrete variable per valid cell,
/// one unary factor per variable, one Potts-like factor per graph edge.
#[derive(Clone, Debug)]
pub struct PairwiseMrf {
    domain: usize,
    cells: Vec<CellIndex>,
    /// Normalised unary tables, `domain` entries per variable.
    unary: Vec<f64>,
    /// Log of each unary normaliser.
    log_norm: Vec<f64>,
    edges: Vec<(usize, usize)>,
    factors: Vec<PairwiseFactor>,
    adjacency: Vec<Vec<usize>>,
}

impl PairwiseMrf {
    /// Unaries come from `mixture` (`w_k · N(mean | ŷ_k, σ²_k + var)`); without
    /// a mixture every variable has the single label 0.
    pub fn build(
        dem: &Dem,
        graph: &RegionGraph,
        mixture: Option<&PlaneMixture>,
        prior: &SmoothnessPrior,
    ) -> Result<Self> {
        let n = graph.vertex_count();
        let domain = mixture.map_or(1, |m| m.len().max(1));
        let mut unary = vec![0.0; n * domain];
        let mut log_norm = vec![0.0; n];
        let mut cells = Vec::with_capacity(n);

        for v in 0..n {
            let idx = graph.vertex_cell(v)?;
            cells.push(idx);
            let row = &mut unary[v * domain..(v + 1) * domain];
            match mixture {
                Some(m) if domain > 1 => {
                    let cell = dem.cell(idx)?;
                    let center = cell.center();
                    let (mean, var) = (cell.mean(), cell.variance());
                    for (k, u) in row.iter_mut().enumerate() {
                        let c = &m.components[k];
                        *u = if c.is_active() {
                            let predicted = c.predict(center.x, center.y);
                            c.weight.ln()
                                + HeightDistribution::new(predicted, c.variance + var)
                                    .with_variance_floor(m.min_variance())
                                    .ln_pdf(mean)
                        } else {
                            f64::NEG_INFINITY
                        };
                    }
                    log_norm[v] = normalize_log_row(row).ok_or_else(|| {
                        TerrainError::degenerate(format!(
                            "unary factor of cell {:?} has no finite entry",
                            idx
                        ))
                    })?;
                }
                _ => row[0] = 1.0,
            }
        }

        let mut edges = Vec::with_capacity(graph.edge_count());
        let mut factors = Vec::with_capacity(graph.edge_count());
        for e in graph.edges() {
            edges.push((e.a, e.b));
            factors.push(prior.factor(
                &cell_summary(dem, graph, e.a)?,
                &cell_summary(dem, graph, e.b)?,
            ));
        }
        let adjacency = graph.adjacency();
        Ok(Self {
            domain,
            cells,
            unary,
            log_norm,
            edges,
            factors,
            adjacency,
        })
    }

    /// Model from explicit tables. `unary` holds `domain` non-negative,
    /// unnormalised entries per variable; variable `v` is reported at cell
    /// `(0, v)`.
    pub fn from_tables(
        domain: usize,
        unary: Vec<f64>,
        edges: Vec<(usize, usize)>,
        factors: Vec<PairwiseFactor>,
    ) -> Result<Self> {
        if domain == 0 || unary.len() % domain != 0 {
            return Err(TerrainError::config(format!(
                "unary table of length {} does not match domain {domain}",
                unary.len()
            )));
        }
        if edges.len() != factors.len() {
            return Err(TerrainError::config("every edge needs exactly one factor"));
        }
        let n = unary.len() / domain;
        let mut adjacency = vec![Vec::new(); n];
        for (e, &(a, b)) in edges.iter().enumerate() {
            for v in [a, b] {
                if v >= n {
                    return Err(TerrainError::out_of_range("variable", v, n));
                }
            }
            if a == b {
                return Err(TerrainError::config(format!("edge {e} is a self loop")));
            }
            adjacency[a].push(e);
            adjacency[b].push(e);
        }
        let mut table = unary;
        let mut log_norm = vec![0.0; n];
        for (v, row) in table.chunks_mut(domain).enumerate() {
            if row.iter().any(|u| !u.is_finite() || *u < 0.0) {
                return Err(TerrainError::config(format!(
                    "unary factor of variable {v} has negative or non-finite entries"
                )));
            }
            let sum: f64 = row.iter().sum();
            if !(sum > 0.0) {
                return Err(TerrainError::degenerate(format!(
                    "unary factor of variable {v} is identically zero"
                )));
            }
            row.iter_mut().for_each(|u| *u /= sum);
            log_norm[v] = sum.ln();
        }
        Ok(Self {
            domain,
            cells: (0..n).map(|v| CellIndex::new(0, v)).collect(),
            unary: table,
            log_norm,
            edges,
            factors,
            adjacency,
        })
    }

    pub fn domain(&self) -> usize {
        self.domain
    }

    pub fn variable_count(&self) -> usize {
        self.cells.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn cell(&self, v: usize) -> CellIndex {
        self.cells[v]
    }

    pub fn cells(&self) -> &[CellIndex] {
        &self.cells
    }

    pub fn unary(&self, v: usize) -> &[f64] {
        &self.unary[v * self.domain..(v + 1) * self.domain]
    }

    pub fn log_normalizer(&self, v: usize) -> f64 {
        self.log_norm[v]
    }

    pub fn edge(&self, e: usize) -> (usize, usize) {
        self.edges[e]
    }

    pub fn factor(&self, e: usize) -> &PairwiseFactor {
        &self.factors[e]
    }

    /// Incident edge ids of variable `v`.
    pub fn incident(&self, v: usize) -> &[usize] {
        &self.adjacency[v]
    }

    /// Log of the unnormalised joint score of `labels`.
    pub fn log_score(&self, labels: &[usize]) -> f64 {
        let mut total = 0.0;
        for (v, &x) in labels.iter().enumerate() {
            total += self.unary(v)[x].ln() + self.log_norm[v];
        }
        for (e, &(a, b)) in self.edges.iter().enumerate() {
            total += self.factors[e].value(labels[a], labels[b]).ln();
        }
        total
    }
}

/// Raw (unfloored) height summary of a graph vertex.
fn cell_summary(dem: &Dem, graph: &RegionGraph, v: usize) -> Result<HeightDistribution> {
    let cell = dem.cell(graph.vertex_cell(v)?)?;
    Ok(HeightDistribution::new(cell.mean(), cell.variance()))
}

/// Exponentiate and normalise a row of log-values in place; returns the log
/// normaliser, or `None` when no entry is finite.
fn normalize_log_row(row: &mut [f64]) -> Option<f64> {
    let m = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return None;
    }
    let sum: f64 = row.iter().map(|t| (t - m).exp()).sum();
    let log_z = m + sum.ln();
    for t in row.iter_mut() {
        *t = (*t - log_z).exp();
    }
    Some(log_z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_row_normalisation() {
        let mut row = [0.0_f64.ln(), 1.0_f64.ln(), 3.0_f64.ln()];
        let z = normalize_log_row(&mut row).unwrap();
        assert_relative_eq!(z, 4.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(row[1], 0.25, epsilon = 1e-12);
        assert_eq!(row[0], 0.0);

        let mut empty = [f64::NEG_INFINITY; 2];
        assert!(normalize_log_row(&mut empty).is_none());
    }
}
