/// Index-arena union-find with union by rank and path compression.
///
/// Besides the forest it tracks, per root, the component size and the
/// internal difference (largest edge weight merged into it).
#[derive(Clone, Debug)]
pub struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
    size: Vec<usize>,
    int_diff: Vec<f64>,
}

impl DisjointSets {
    /// `n` singletons.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            size: vec![1; n],
            int_diff: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets rooted at `a` and `b` (both must be roots) and set the
    /// internal difference of the result. Returns the new root.
    pub fn union_roots(&mut self, a: usize, b: usize, internal_diff: f64) -> usize {
        if a == b {
            return a;
        }
        let (root, child) = match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => (b, a),
            std::cmp::Ordering::Greater => (a, b),
            std::cmp::Ordering::Equal => {
                self.rank[a] = self.rank[a].saturating_add(1);
                (a, b)
            }
        };
        self.parent[child] = root;
        self.size[root] += self.size[child];
        self.int_diff[root] = internal_diff;
        root
    }

    pub fn size(&mut self, x: usize) -> usize {
        let r = self.find(x);
        self.size[r]
    }

    pub fn internal_diff(&mut self, x: usize) -> f64 {
        let r = self.find(x);
        self.int_diff[r]
    }

    /// Seed the internal difference of the set containing `x`.
    pub fn set_internal_diff(&mut self, x: usize, value: f64) {
        let r = self.find(x);
        self.int_diff[r] = value;
    }
}
