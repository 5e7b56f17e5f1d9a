//! Regression tree structures
//!
//! Trees are stored as an arena of nodes addressed by integer index, with
//! node 0 as the root. Nodes never own each other, so a fitted tree can be
//! shared read-only across any number of concurrent evaluations.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into the encoded vector
/// - `left` and `right` point to child node indices
///
/// For leaf nodes:
/// - `feature_idx == -1`, `left == right == -1`
///
/// Every node carries the mean target of the training samples that reached
/// it (`value`) and how many samples that was (`cover`, bootstrap
/// duplicates counted). Attribution uses covers as the marginal
/// distribution over unknown features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Encoded feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Samples with `x[feature_idx] <= threshold` go left
    pub threshold: f64,

    /// Mean target of samples reaching this node
    pub value: f64,

    /// Number of training samples reaching this node
    pub cover: f64,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(
        feature_idx: i32,
        threshold: f64,
        left: i32,
        right: i32,
        value: f64,
        cover: f64,
    ) -> Self {
        Self {
            left,
            right,
            feature_idx,
            threshold,
            value,
            cover,
        }
    }

    /// Create a new leaf node
    pub fn leaf(value: f64, cover: f64) -> Self {
        Self {
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            value,
            cover,
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.feature_idx < 0
    }

    /// Child followed by a record with the given feature value
    pub fn next(&self, feature_value: f64) -> usize {
        if feature_value <= self.threshold {
            self.left as usize
        } else {
            self.right as usize
        }
    }
}

/// A single regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on an encoded vector.
    ///
    /// The tree must have passed [`Tree::validate`] for a width no larger
    /// than `features.len()`.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        self.nodes[self.leaf_index(features)].value
    }

    /// Index of the leaf reached by `features`
    pub fn leaf_index(&self, features: &[f64]) -> usize {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return idx;
            }
            idx = node.next(features[node.feature_idx as usize]);
        }
    }

    /// Get the root node
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Cover-weighted mean of the leaf values: the tree's output when
    /// nothing about the record is known
    pub fn expected_value(&self) -> f64 {
        let (weighted, total) = self
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .fold((0.0, 0.0), |(w, t), n| (w + n.value * n.cover, t + n.cover));
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    /// Number of edges on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.is_leaf() {
                0
            } else {
                1 + walk(nodes, node.left as usize).max(walk(nodes, node.right as usize))
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Validate tree structure against an encoded width
    pub fn validate(&self, width: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.cover.is_nan() || node.cover <= 0.0 {
                return Err(format!("Node {i} has non-positive cover: {}", node.cover));
            }
            if node.is_leaf() {
                if node.left != -1 || node.right != -1 {
                    return Err(format!("Leaf node {i} has children"));
                }
                continue;
            }

            if node.feature_idx as usize >= width {
                return Err(format!(
                    "Node {} splits on feature {} outside width {}",
                    i, node.feature_idx, width
                ));
            }
            // Children are stored after their parent, which also rules out cycles
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= len {
                    return Err(format!("Node {i} has invalid child: {child}"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        // if x[0] <= 50 -> 100 else 200
        Tree::new(vec![
            Node::internal(0, 50.0, 1, 2, 160.0, 5.0),
            Node::leaf(100.0, 2.0),
            Node::leaf(200.0, 3.0),
        ])
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(3, 1.5, 1, 2, 0.0, 10.0);
        assert_eq!(internal.feature_idx, 3);
        assert!(!internal.is_leaf());

        let leaf = Node::leaf(-2.5, 4.0);
        assert_eq!(leaf.feature_idx, -1);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.value, -2.5);
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[30.0]), 100.0);
        assert_eq!(tree.evaluate(&[50.0]), 100.0); // Equal goes left
        assert_eq!(tree.evaluate(&[60.0]), 200.0);
    }

    #[test]
    fn test_expected_value_weights_by_cover() {
        assert!((stump().expected_value() - 160.0).abs() < 1e-12);
        assert_eq!(stump().depth(), 1);
        assert_eq!(stump().leaf_count(), 2);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate(1).is_ok());
        assert!(stump().validate(0).is_err());

        let bad_child = Tree::new(vec![
            Node::internal(0, 50.0, 5, 2, 0.0, 2.0),
            Node::leaf(1.0, 1.0),
            Node::leaf(2.0, 1.0),
        ]);
        assert!(bad_child.validate(1).is_err());

        let cycle = Tree::new(vec![
            Node::internal(0, 50.0, 0, 1, 0.0, 2.0),
            Node::leaf(1.0, 1.0),
        ]);
        assert!(cycle.validate(1).is_err());

        assert!(Tree::new(vec![]).validate(1).is_err());
    }
}
