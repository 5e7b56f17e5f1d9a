//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy regression tree induction: every node tries every feature
//! and every midpoint between consecutive distinct values, and keeps the
//! split with the lowest summed squared error over the two children.

use std::cmp::Ordering;

use crate::tree::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug, PartialEq)]
pub struct TreeParams {
    /// Maximum number of splits from root to leaf; `None` grows until pure
    pub max_depth: Option<usize>,
    /// Nodes with fewer samples become leaves
    pub min_samples_split: usize,
    /// Every split must leave at least this many samples on each side
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Split candidate. Candidates are scanned by ascending feature index and
/// threshold and only a strictly better score replaces the incumbent, so
/// ties resolve to the lowest (feature, threshold) pair.
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// `S_l² / n_l + S_r² / n_r`; larger means lower child squared error
    score: f64,
}

/// Build a regression tree over a sample of rows of a shared dataset
pub struct CartBuilder<'a> {
    params: TreeParams,
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    /// `features` rows must all have the same width and match `targets` in length
    pub fn new(features: &'a [Vec<f64>], targets: &'a [f64], params: TreeParams) -> Self {
        debug_assert_eq!(features.len(), targets.len());
        let feature_count = features.first().map_or(0, Vec::len);

        Self {
            params,
            features,
            targets,
            feature_count,
        }
    }

    /// Build a tree from the given sample; an index may appear several times
    pub fn build(&self, sample: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        if sample.is_empty() {
            nodes.push(Node::leaf(0.0, 1.0));
        } else {
            self.build_node(sample, 0, &mut nodes);
        }
        Tree::new(nodes)
    }

    /// Recursively build tree nodes in preorder; returns the node index
    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        let current_idx = nodes.len();
        let cover = indices.len() as f64;
        let value = self.mean_target(indices);

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf
            || self.is_pure(indices)
        {
            nodes.push(Node::leaf(value, cover));
            return current_idx as i32;
        }

        let split = match self.find_best_split(indices) {
            Some(s) => s,
            None => {
                nodes.push(Node::leaf(value, cover));
                return current_idx as i32;
            }
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&idx| self.features[idx][split.feature_idx] <= split.threshold);

        // Reserve space for current node
        nodes.push(Node::internal(
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
            value,
            cover,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx as i32
    }

    /// Find best split using the exact-greedy algorithm
    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();

        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature_idx in 0..self.feature_count {
            column.clear();
            column.extend(
                indices
                    .iter()
                    .map(|&i| (self.features[i][feature_idx], self.targets[i])),
            );
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            if column[0].0 == column[n - 1].0 {
                continue;
            }

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += column[i].1;
                let left_n = i + 1;
                let right_n = n - left_n;

                if column[i].0 == column[i + 1].0 {
                    continue;
                }
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;

                let better = match &best {
                    None => true,
                    Some(current) => score.partial_cmp(&current.score) == Some(Ordering::Greater),
                };
                if better {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: midpoint(column[i].0, column[i + 1].0),
                        score,
                    });
                }
            }
        }

        best
    }

    fn mean_target(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        indices.iter().map(|&i| self.targets[i]).sum::<f64>() / indices.len() as f64
    }

    fn is_pure(&self, indices: &[usize]) -> bool {
        let first = self.targets[indices[0]];
        indices.iter().all(|&i| self.targets[i] == first)
    }
}

/// Threshold between two distinct sorted values that keeps `lo` on the left
/// and `hi` on the right even when they are adjacent floats
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo / 2.0 + hi / 2.0;
    if mid >= hi || mid < lo {
        lo
    } else {
        mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_simple_split() {
        let features = vec![vec![1.0, 9.0], vec![2.0, 8.0], vec![3.0, 9.0], vec![4.0, 8.0]];
        let targets = vec![10.0, 10.0, 20.0, 20.0];

        let builder = CartBuilder::new(&features, &targets, TreeParams::default());
        let tree = builder.build(&all(4));

        assert_eq!(tree.nodes.len(), 3);
        let root = &tree.nodes[0];
        assert_eq!(root.feature_idx, 0);
        assert_eq!(root.threshold, 2.5);
        assert_eq!(root.cover, 4.0);
        assert_eq!(root.value, 15.0);
        assert_eq!(tree.evaluate(&[1.5, 0.0]), 10.0);
        assert_eq!(tree.evaluate(&[3.5, 0.0]), 20.0);
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = vec![vec![1.0]];
        let targets = vec![5.0];

        let tree = CartBuilder::new(&features, &targets, TreeParams::default()).build(&[0]);
        assert_eq!(tree.nodes.len(), 1);
        assert!(tree.nodes[0].is_leaf());
        assert_eq!(tree.nodes[0].value, 5.0);
    }

    #[test]
    fn test_constant_feature_never_split() {
        let features = vec![vec![7.0], vec![7.0], vec![7.0]];
        let targets = vec![1.0, 2.0, 3.0];

        let tree = CartBuilder::new(&features, &targets, TreeParams::default()).build(&all(3));
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].value, 2.0);
    }

    #[test]
    fn test_max_depth_respected() {
        let features: Vec<Vec<f64>> = (0..32).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..32).map(|i| (i * i) as f64).collect();
        let params = TreeParams {
            max_depth: Some(3),
            ..TreeParams::default()
        };

        let tree = CartBuilder::new(&features, &targets, params).build(&all(32));
        assert_eq!(tree.depth(), 3);
        assert!(tree.leaf_count() <= 8);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| if i == 0 { 100.0 } else { 0.0 }).collect();
        let params = TreeParams {
            min_samples_leaf: 3,
            ..TreeParams::default()
        };

        let tree = CartBuilder::new(&features, &targets, params).build(&all(10));
        assert!(tree
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .all(|n| n.cover >= 3.0));
    }

    #[test]
    fn test_duplicate_samples_count_in_cover() {
        let features = vec![vec![0.0], vec![1.0]];
        let targets = vec![0.0, 10.0];

        let tree = CartBuilder::new(&features, &targets, TreeParams::default()).build(&[0, 0, 0, 1]);
        assert_eq!(tree.nodes[0].cover, 4.0);
        assert_eq!(tree.nodes[0].value, 2.5);
        assert_eq!(tree.nodes[1].cover, 3.0);
        assert_eq!(tree.nodes[2].cover, 1.0);
    }

    #[test]
    fn test_midpoint_of_adjacent_floats() {
        let lo = 1.0f64;
        let hi = f64::from_bits(lo.to_bits() + 1);
        let t = midpoint(lo, hi);
        assert!(lo <= t && t < hi);
    }
}
