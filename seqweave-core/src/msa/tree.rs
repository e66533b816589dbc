//! Guide tree built by agglomerative clustering of a distance matrix

use super::distance::DistanceMatrix;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the distance from a merged cluster to the others is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateDistanceMethod {
    /// Size-weighted mean of the two merged distances
    #[default]
    Average,
    Single,
    Complete,
    /// `0.9 * min + 0.1 * mean`
    WeightedMafft,
}

impl UpdateDistanceMethod {
    fn update(&self, d1: f64, size1: usize, d2: f64, size2: usize) -> f64 {
        match self {
            UpdateDistanceMethod::Average => {
                (d1 * size1 as f64 + d2 * size2 as f64) / (size1 + size2) as f64
            }
            UpdateDistanceMethod::Single => d1.min(d2),
            UpdateDistanceMethod::Complete => d1.max(d2),
            UpdateDistanceMethod::WeightedMafft => 0.9 * d1.min(d2) + 0.1 * (d1 + d2) / 2.0,
        }
    }
}

/// Guide tree node. Leaves carry the input index of their sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: usize,
    pub children: Option<(usize, usize)>,
    pub parent: Option<usize>,
    /// Distance at which the children were merged (0 for leaves)
    pub distance: f64,
    /// Number of leaves below this node
    pub size: usize,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Binary guide tree stored in an arena: nodes `0..n` are the leaves, later
/// nodes are merges in creation order and the last node is the root
#[derive(Debug, Clone, PartialEq)]
pub struct GuideTree {
    nodes: Vec<TreeNode>,
    leaves: usize,
}

impl GuideTree {
    /// Cluster `distances` by repeatedly merging the closest pair of active
    /// clusters; the lowest index pair wins ties
    pub fn build(distances: &DistanceMatrix, method: UpdateDistanceMethod) -> Result<Self> {
        let n = distances.dimension();
        if n == 0 {
            return Err(Error::empty_input("distance matrix"));
        }

        let mut nodes: Vec<TreeNode> = (0..n)
            .map(|id| TreeNode {
                id,
                children: None,
                parent: None,
                distance: 0.0,
                size: 1,
            })
            .collect();
        // distances between active clusters, indexed by node id
        let total = 2 * n - 1;
        let mut d = vec![vec![0.0f64; total]; total];
        for (i, row) in d.iter_mut().enumerate().take(n) {
            for (j, value) in row.iter_mut().enumerate().take(n) {
                *value = distances.get(i, j);
            }
        }
        let mut active: Vec<usize> = (0..n).collect();

        while active.len() > 1 {
            let (mut a, mut b) = (active[0], active[1]);
            let mut smallest = d[a][b];
            for (x, &i) in active.iter().enumerate() {
                for &j in &active[x + 1..] {
                    if d[i][j] < smallest {
                        smallest = d[i][j];
                        a = i;
                        b = j;
                    }
                }
            }

            let id = nodes.len();
            let size = nodes[a].size + nodes[b].size;
            for &other in &active {
                if other != a && other != b {
                    let value =
                        method.update(d[a][other], nodes[a].size, d[b][other], nodes[b].size);
                    d[id][other] = value;
                    d[other][id] = value;
                }
            }
            nodes[a].parent = Some(id);
            nodes[b].parent = Some(id);
            nodes.push(TreeNode {
                id,
                children: Some((a, b)),
                parent: None,
                distance: smallest,
                size,
            });
            active.retain(|&c| c != a && c != b);
            active.push(id);
        }

        log::debug!("Built guide tree over {} sequences", n);
        Ok(Self { nodes, leaves: n })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves
    }

    pub fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Input indices of the leaves below `id`, ascending
    pub fn leaves_under(&self, id: usize) -> Vec<usize> {
        let mut stack = vec![id];
        let mut leaves = Vec::new();
        while let Some(current) = stack.pop() {
            match self.nodes[current].children {
                Some((left, right)) => {
                    stack.push(left);
                    stack.push(right);
                }
                None => leaves.push(current),
            }
        }
        leaves.sort_unstable();
        leaves
    }

    /// Internal nodes grouped by height: every node in a group only depends
    /// on nodes of earlier groups
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let mut height = vec![0usize; self.nodes.len()];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        // children always precede their parent in the arena
        for node in &self.nodes[self.leaves..] {
            if let Some((left, right)) = node.children {
                let h = height[left].max(height[right]) + 1;
                height[node.id] = h;
                if levels.len() < h {
                    levels.resize_with(h, Vec::new);
                }
                levels[h - 1].push(node.id);
            }
        }
        levels
    }

    /// Edges as child node ids, in arena order (the root has no edge)
    pub fn edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.parent.is_some())
            .map(|node| node.id)
    }
}
