use super::GroundTruth;
use crate::error::{Result, TerrainError};
use crate::types::TerrainResult;
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

/// Co-occurrence counts of predicted labels (rows) and reference classes
/// (columns). Ids are re-indexed densely in ascending order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContingencyTable {
    pub labels: Vec<usize>,
    pub classes: Vec<usize>,
    /// Row-major `labels.len() × classes.len()`.
    pub counts: Vec<usize>,
}

impl ContingencyTable {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let pairs: Vec<(usize, usize)> = pairs.into_iter().collect();
        let labels: Vec<usize> = pairs
            .iter()
            .map(|p| p.0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let classes: Vec<usize> = pairs
            .iter()
            .map(|p| p.1)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut counts = vec![0; labels.len() * classes.len()];
        for (label, class) in pairs {
            // Both ids are present by construction.
            let r = labels.binary_search(&label).unwrap_or(0);
            let c = classes.binary_search(&class).unwrap_or(0);
            counts[r * classes.len() + c] += 1;
        }
        Self {
            labels,
            classes,
            counts,
        }
    }

    pub fn rows(&self) -> usize {
        self.labels.len()
    }

    pub fn cols(&self) -> usize {
        self.classes.len()
    }

    pub fn count(&self, row: usize, col: usize) -> usize {
        self.counts[row * self.cols() + col]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Table whose row `i` is row `row_perm[i]` of `self` (same for columns).
    pub fn permuted(&self, row_perm: &[usize], col_perm: &[usize]) -> Result<Self> {
        check_permutation(row_perm, self.rows(), "row")?;
        check_permutation(col_perm, self.cols(), "column")?;
        let mut counts = Vec::with_capacity(self.counts.len());
        for &r in row_perm {
            for &c in col_perm {
                counts.push(self.count(r, c));
            }
        }
        Ok(Self {
            labels: row_perm.iter().map(|&r| self.labels[r]).collect(),
            classes: col_perm.iter().map(|&c| self.classes[c]).collect(),
            counts,
        })
    }

    fn row_sums(&self) -> Vec<usize> {
        (0..self.rows())
            .map(|r| (0..self.cols()).map(|c| self.count(r, c)).sum())
            .collect()
    }

    fn col_sums(&self) -> Vec<usize> {
        (0..self.cols())
            .map(|c| (0..self.rows()).map(|r| self.count(r, c)).sum())
            .collect()
    }
}

fn check_permutation(perm: &[usize], len: usize, what: &str) -> Result<()> {
    let mut seen = vec![false; len];
    if perm.len() != len {
        return Err(TerrainError::invalid(format!(
            "{what} permutation has {} entries, expected {len}",
            perm.len()
        )));
    }
    for &p in perm {
        if p >= len || std::mem::replace(&mut seen[p], true) {
            return Err(TerrainError::invalid(format!(
                "{what} permutation is not a bijection of 0..{len}"
            )));
        }
    }
    Ok(())
}

/// Homogeneity, completeness and their weighted harmonic mean.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VMeasure {
    pub homogeneity: f64,
    pub completeness: f64,
    pub v_measure: f64,
    pub beta: f64,
    pub samples: usize,
}

impl VMeasure {
    pub fn from_table(table: &ContingencyTable, beta: f64) -> Self {
        let n = table.total() as f64;
        let rows = table.row_sums();
        let cols = table.col_sums();

        let entropy = |sums: &[usize]| -> f64 {
            sums.iter()
                .filter(|&&s| s > 0)
                .map(|&s| {
                    let p = s as f64 / n;
                    -p * p.ln()
                })
                .sum()
        };
        let h_class = entropy(&cols);
        let h_label = entropy(&rows);

        let mut h_class_given_label = 0.0;
        let mut h_label_given_class = 0.0;
        for r in 0..table.rows() {
            for c in 0..table.cols() {
                let nrc = table.count(r, c);
                if nrc == 0 {
                    continue;
                }
                let joint = nrc as f64 / n;
                h_class_given_label -= joint * (nrc as f64 / rows[r] as f64).ln();
                h_label_given_class -= joint * (nrc as f64 / cols[c] as f64).ln();
            }
        }

        let homogeneity = if h_class > 0.0 {
            1.0 - h_class_given_label / h_class
        } else {
            1.0
        };
        let completeness = if h_label > 0.0 {
            1.0 - h_label_given_class / h_label
        } else {
            1.0
        };
        let denom = beta * homogeneity + completeness;
        let v_measure = if denom > 0.0 {
            (1.0 + beta) * homogeneity * completeness / denom
        } else {
            0.0
        };
        Self {
            homogeneity,
            completeness,
            v_measure,
            beta,
            samples: table.total(),
        }
    }
}

/// Score `result` against `truth`, pairing every labelled cell whose centre
/// lies inside a ground-truth polygon.
pub fn evaluate(result: &TerrainResult, truth: &GroundTruth, beta: f64) -> Result<VMeasure> {
    let geometry = result.geometry;
    let pairs: Vec<(usize, usize)> = result
        .labelled_cells()
        .filter_map(|(idx, label)| truth.class_at(geometry.center(idx)).map(|class| (label, class)))
        .collect();
    if pairs.is_empty() {
        return Err(TerrainError::invalid(
            "no labelled cell lies inside a ground-truth polygon",
        ));
    }
    let table = ContingencyTable::from_pairs(pairs);
    let score = VMeasure::from_table(&table, beta);
    debug!(
        "evaluate: cells={} labels={} classes={} h={:.4} c={:.4} v={:.4}",
        score.samples,
        table.rows(),
        table.cols(),
        score.homogeneity,
        score.completeness,
        score.v_measure
    );
    Ok(score)
}
