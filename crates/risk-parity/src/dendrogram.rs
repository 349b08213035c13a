use crate::error::RiskParityError;
use configuration::LinkageMethod;
use nalgebra::DMatrix;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// One node of the dendrogram arena.
///
/// Leaves `0..n` are the input assets. Internal nodes get ids `n..2n-1` in
/// merge order; `left` is always the lower of the two child ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub id: usize,
    pub left: Option<usize>,
    pub right: Option<usize>,
    /// Linkage distance at which the children merged (0 for leaves).
    pub distance: f64,
    /// Number of leaves below this node.
    pub size: usize,
}

impl ClusterNode {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    a: usize,
    b: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Equal distances fall back to the lower-indexed pair.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.a.cmp(&other.a))
            .then(self.b.cmp(&other.b))
    }
}

/// Binary merge tree produced by agglomerative clustering.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    nodes: Vec<ClusterNode>,
    leaves: usize,
}

impl Dendrogram {
    /// Clusters `n` items from a symmetric `n x n` distance matrix.
    pub fn build(distances: &DMatrix<f64>, linkage: LinkageMethod) -> Result<Self, RiskParityError> {
        let n = distances.nrows();
        if n == 0 || !distances.is_square() {
            return Err(RiskParityError::Clustering(format!(
                "expected a non-empty square distance matrix, got {}x{}",
                distances.nrows(),
                distances.ncols()
            )));
        }

        let total = 2 * n - 1;
        let mut nodes: Vec<ClusterNode> = (0..n)
            .map(|id| ClusterNode { id, left: None, right: None, distance: 0.0, size: 1 })
            .collect();
        let mut active = vec![false; total];
        active[..n].fill(true);

        let mut between = DMatrix::from_element(total, total, f64::INFINITY);
        between.view_mut((0, 0), (n, n)).copy_from(distances);

        let mut heap = BinaryHeap::with_capacity(n * n);
        for a in 0..n {
            for b in (a + 1)..n {
                heap.push(Reverse(Candidate { distance: distances[(a, b)], a, b }));
            }
        }

        while nodes.len() < total {
            let Reverse(candidate) = heap.pop().ok_or_else(|| {
                RiskParityError::Clustering("ran out of candidate pairs".to_string())
            })?;
            // Stale entry: one side was already merged.
            if !active[candidate.a] || !active[candidate.b] {
                continue;
            }

            let id = nodes.len();
            let (a, b) = (candidate.a, candidate.b);
            let (size_a, size_b) = (nodes[a].size, nodes[b].size);
            nodes.push(ClusterNode {
                id,
                left: Some(a),
                right: Some(b),
                distance: candidate.distance,
                size: size_a + size_b,
            });
            active[a] = false;
            active[b] = false;

            // Lance-Williams update of the distance to every surviving cluster.
            for k in 0..id {
                if !active[k] {
                    continue;
                }
                let (d_a, d_b) = (between[(a, k)], between[(b, k)]);
                let d = match linkage {
                    LinkageMethod::Single => d_a.min(d_b),
                    LinkageMethod::Complete => d_a.max(d_b),
                    LinkageMethod::Average => {
                        (size_a as f64 * d_a + size_b as f64 * d_b) / (size_a + size_b) as f64
                    }
                };
                between[(id, k)] = d;
                between[(k, id)] = d;
                heap.push(Reverse(Candidate { distance: d, a: k, b: id }));
            }
            active[id] = true;
        }

        Ok(Self { nodes, leaves: n })
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &ClusterNode {
        &self.nodes[id]
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves
    }

    pub fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Leaves below `id`, left subtree first.
    pub fn leaves_under(&self, id: usize) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes[id].size);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            match (node.left, node.right) {
                (Some(left), Some(right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                _ => order.push(current),
            }
        }
        order
    }

    /// Quasi-diagonal order: every leaf, left subtree first.
    pub fn leaf_order(&self) -> Vec<usize> {
        self.leaves_under(self.root())
    }
}
