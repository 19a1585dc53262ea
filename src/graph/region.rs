use crate::dem::Dem;
use crate::error::{Result, TerrainError};
use crate::stats::HeightDistribution;
use crate::types::CellIndex;
use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

/// Undirected edge between two graph vertices.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    /// Symmetric KL divergence between the two cells' height distributions.
    pub weight: f64,
}

impl Edge {
    /// The endpoint opposite to `v`, if `v` is on this edge.
    pub fn other(&self, v: usize) -> Option<usize> {
        if v == self.a {
            Some(self.b)
        } else if v == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// 4-neighbourhood adjacency over the valid cells of a [`Dem`].
#[derive(Clone, Debug, Default)]
pub struct RegionGraph {
    vertices: Vec<CellIndex>,
    distributions: Vec<HeightDistribution>,
    vertex_lookup: Vec<Option<usize>>,
    cols: usize,
    edges: Vec<Edge>,
}

impl RegionGraph {
    /// Vertices are the valid cells in row-major order; each vertex links to
    /// its right and lower neighbour when those are valid too.
    pub fn build(dem: &Dem) -> Self {
        let rows = dem.rows();
        let cols = dem.cols();
        let floor = dem.variance_floor();
        let mut vertex_lookup = vec![None; rows * cols];
        let mut vertices = Vec::with_capacity(dem.valid_cells_count());
        let mut distributions = Vec::with_capacity(dem.valid_cells_count());
        for (idx, cell) in dem.valid_cells() {
            vertex_lookup[idx.row * cols + idx.col] = Some(vertices.len());
            vertices.push(idx);
            distributions.push(cell.distribution(floor));
        }

        let mut pairs = Vec::with_capacity(2 * vertices.len());
        for (a, idx) in vertices.iter().enumerate() {
            if idx.col + 1 < cols {
                if let Some(b) = vertex_lookup[idx.row * cols + idx.col + 1] {
                    pairs.push((a, b));
                }
            }
            if idx.row + 1 < rows {
                if let Some(b) = vertex_lookup[(idx.row + 1) * cols + idx.col] {
                    pairs.push((a, b));
                }
            }
        }
        let edges = weigh_edges(&pairs, &distributions);
        debug!(
            "RegionGraph::build vertices={} edges={}",
            vertices.len(),
            edges.len()
        );
        Self {
            vertices,
            distributions,
            vertex_lookup,
            cols,
            edges,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, i: usize) -> Result<&Edge> {
        self.edges
            .get(i)
            .ok_or_else(|| TerrainError::out_of_range("edge", i, self.edges.len()))
    }

    pub fn vertex_cell(&self, v: usize) -> Result<CellIndex> {
        self.vertices
            .get(v)
            .copied()
            .ok_or_else(|| TerrainError::out_of_range("vertex", v, self.vertices.len()))
    }

    /// Floored height distribution of vertex `v`.
    pub fn vertex_distribution(&self, v: usize) -> Result<&HeightDistribution> {
        self.distributions
            .get(v)
            .ok_or_else(|| TerrainError::out_of_range("vertex", v, self.vertices.len()))
    }

    /// Vertex id of `cell`, or `None` when the cell is not part of the graph.
    pub fn vertex_of(&self, cell: CellIndex) -> Option<usize> {
        if cell.col >= self.cols {
            return None;
        }
        self.vertex_lookup
            .get(cell.row * self.cols + cell.col)
            .copied()
            .flatten()
    }

    pub fn vertices(&self) -> &[CellIndex] {
        &self.vertices
    }

    /// Incident edge ids per vertex.
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.vertices.len()];
        for (i, e) in self.edges.iter().enumerate() {
            adj[e.a].push(i);
            adj[e.b].push(i);
        }
        adj
    }

    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|e| e.weight).sum()
    }
}

fn weigh(pair: &(usize, usize), distributions: &[HeightDistribution]) -> Edge {
    let (a, b) = *pair;
    Edge {
        a,
        b,
        weight: distributions[a].symmetric_kl(&distributions[b]),
    }
}

fn weigh_edges(pairs: &[(usize, usize)], distributions: &[HeightDistribution]) -> Vec<Edge> {
    #[cfg(feature = "parallel")]
    {
        pairs.par_iter().map(|p| weigh(p, distributions)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        pairs.iter().map(|p| weigh(p, distributions)).collect()
    }
}
