use super::{DisjointSets, RegionGraph};
use crate::error::{Result, TerrainError};
use log::debug;
use serde::Serialize;

/// Set of graph vertices merged by the segmentation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Largest edge weight merged into the component; 0 for singletons.
    pub internal_diff: f64,
    /// Vertex ids, ascending.
    pub members: Vec<usize>,
}

impl Component {
    pub fn new(mut members: Vec<usize>) -> Self {
        members.sort_unstable();
        Self {
            internal_diff: 0.0,
            members,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `Int(C) + k / |C|`, the merge tolerance of this component.
    pub fn threshold(&self, k: f64) -> Result<f64> {
        if self.members.is_empty() {
            return Err(TerrainError::invalid(
                "threshold of an empty component is undefined",
            ));
        }
        Ok(self.internal_diff + k / self.members.len() as f64)
    }
}

/// Partition of the graph vertices.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segmentation {
    /// Ordered by smallest member.
    pub components: Vec<Component>,
    pub vertex_component: Vec<usize>,
    pub merges: usize,
}

impl Segmentation {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component_of(&self, v: usize) -> Result<usize> {
        self.vertex_component
            .get(v)
            .copied()
            .ok_or_else(|| TerrainError::out_of_range("vertex", v, self.vertex_component.len()))
    }

    pub fn largest(&self) -> usize {
        self.components.iter().map(Component::len).max().unwrap_or(0)
    }
}

/// Felzenszwalb–Huttenlocher agglomeration over a [`RegionGraph`].
#[derive(Clone, Copy, Debug)]
pub struct GraphSegmenter {
    k: f64,
}

impl GraphSegmenter {
    /// `k` scales the merge tolerance of small components; it must be
    /// positive (`f64::INFINITY` merges every connected piece).
    pub fn new(k: f64) -> Result<Self> {
        if !(k > 0.0) {
            return Err(TerrainError::config(format!(
                "segmentation k must be positive, got {k}"
            )));
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Segment starting from singleton components.
    pub fn segment(&self, graph: &RegionGraph) -> Segmentation {
        let sets = DisjointSets::new(graph.vertex_count());
        self.agglomerate(graph, sets)
    }

    /// Segment starting from `initial`, which must partition the vertices.
    pub fn segment_from(&self, graph: &RegionGraph, initial: &[Component]) -> Result<Segmentation> {
        let n = graph.vertex_count();
        let mut seen = vec![false; n];
        let mut sets = DisjointSets::new(n);
        for comp in initial {
            let Some(&first) = comp.members.first() else {
                return Err(TerrainError::invalid("initial component is empty"));
            };
            for &v in &comp.members {
                if v >= n {
                    return Err(TerrainError::out_of_range("vertex", v, n));
                }
                if std::mem::replace(&mut seen[v], true) {
                    return Err(TerrainError::config(format!(
                        "vertex {v} appears in more than one initial component"
                    )));
                }
                let (ra, rb) = (sets.find(first), sets.find(v));
                sets.union_roots(ra, rb, 0.0);
            }
            sets.set_internal_diff(first, comp.internal_diff.max(0.0));
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(TerrainError::config(format!(
                "vertex {missing} is not covered by the initial components"
            )));
        }
        Ok(self.agglomerate(graph, sets))
    }

    fn agglomerate(&self, graph: &RegionGraph, mut sets: DisjointSets) -> Segmentation {
        let edges = graph.edges();
        let mut order: Vec<usize> = (0..edges.len()).collect();
        // stable: equal weights keep edge order
        order.sort_by(|&i, &j| edges[i].weight.total_cmp(&edges[j].weight));

        let mut merges = 0usize;
        for i in order {
            let e = &edges[i];
            let ra = sets.find(e.a);
            let rb = sets.find(e.b);
            if ra == rb {
                continue;
            }
            let ta = sets.internal_diff(ra) + self.k / sets.size(ra) as f64;
            let tb = sets.internal_diff(rb) + self.k / sets.size(rb) as f64;
            if e.weight <= ta.min(tb) {
                let diff = e
                    .weight
                    .max(sets.internal_diff(ra))
                    .max(sets.internal_diff(rb));
                sets.union_roots(ra, rb, diff);
                merges += 1;
            }
        }

        let segmentation = collect_components(&mut sets, merges);
        debug!(
            "GraphSegmenter k={} vertices={} components={} merges={}",
            self.k,
            sets.len(),
            segmentation.len(),
            merges
        );
        segmentation
    }
}

fn collect_components(sets: &mut DisjointSets, merges: usize) -> Segmentation {
    let n = sets.len();
    let mut root_slot = vec![usize::MAX; n];
    let mut components: Vec<Component> = Vec::new();
    let mut vertex_component = Vec::with_capacity(n);
    for v in 0..n {
        let r = sets.find(v);
        if root_slot[r] == usize::MAX {
            root_slot[r] = components.len();
            components.push(Component {
                internal_diff: sets.internal_diff(r),
                members: Vec::new(),
            });
        }
        let slot = root_slot[r];
        components[slot].members.push(v);
        vertex_component.push(slot);
    }
    Segmentation {
        components,
        vertex_component,
        merges,
    }
}
