//! Bagged regression forest
//!
//! Every tree is induced on its own bootstrap resample of the encoded
//! training set and the forest predicts the arithmetic mean of the trees.
//! Tree `i` samples from a generator seeded with `derive_seed(seed, i)`, so
//! trees are built in parallel and still come out identical for a given
//! seed no matter how the work is scheduled.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::cart::{CartBuilder, TreeParams};
use crate::deterministic::{bootstrap_indices, derive_seed, LcgRng};
use crate::errors::{Result, ValuationError};
use crate::tree::Tree;

/// Forest training parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub tree_count: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            tree_count: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl ForestParams {
    /// Reject parameter combinations that cannot train a forest
    pub fn validate(&self) -> Result<()> {
        if self.tree_count == 0 {
            return Err(ValuationError::Config("tree_count must be at least 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ValuationError::Config(
                "min_samples_leaf must be at least 1".into(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ValuationError::Config(
                "min_samples_split must be at least 2".into(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ValuationError::Config("max_depth must be at least 1".into()));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// Ensemble of regression trees fitted against one encoded width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<Tree>,
    width: usize,
}

impl Forest {
    /// Fit a forest on encoded rows
    #[instrument(skip(rows, targets, params), fields(rows = rows.len(), trees = params.tree_count))]
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: &ForestParams) -> Result<Self> {
        params.validate().map_err(|e| ValuationError::Training(e.to_string()))?;

        if rows.is_empty() {
            return Err(ValuationError::Training("training set is empty".into()));
        }
        if rows.len() != targets.len() {
            return Err(ValuationError::schema("target column", rows.len(), targets.len()));
        }

        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|row| row.len() != width) {
            return Err(ValuationError::schema("training row", width, bad.len()));
        }
        if let Some(pos) = targets.iter().position(|t| !t.is_finite()) {
            return Err(ValuationError::data(
                "target",
                format!("row {}: missing or non-numeric value {}", pos + 1, targets[pos]),
            ));
        }

        let n = rows.len();
        let builder = CartBuilder::new(rows, targets, params.tree_params());

        let trees: Vec<Tree> = (0..params.tree_count)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = LcgRng::new(derive_seed(params.seed, tree_idx as u64));
                let sample = bootstrap_indices(&mut rng, n);
                let tree = builder.build(&sample);
                debug!(
                    "Tree {}/{}: {} nodes, depth {}",
                    tree_idx + 1,
                    params.tree_count,
                    tree.nodes.len(),
                    tree.depth()
                );
                tree
            })
            .collect();

        let forest = Self { trees, width };
        info!(
            "Forest fitted: {} trees, {} nodes total, average depth {:.1}",
            forest.n_trees(),
            forest.total_nodes(),
            forest.avg_depth()
        );
        Ok(forest)
    }

    /// Assemble a forest from existing trees, validating them against `width`
    pub fn from_trees(trees: Vec<Tree>, width: usize) -> Result<Self> {
        let forest = Self { trees, width };
        forest.validate()?;
        Ok(forest)
    }

    /// Check that every split indexes into the encoded layout
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ValuationError::Artifact("forest has no trees".into()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.width).map_err(|e| {
                ValuationError::Artifact(format!("tree {i} validation failed: {e}"))
            })?;
        }
        Ok(())
    }

    /// Mean of the per-tree outputs for one encoded vector
    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        self.check_width("forest predict", features.len())?;
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    /// Individual tree outputs for one encoded vector (useful for debugging)
    pub fn tree_predictions(&self, features: &[f64]) -> Result<Vec<f64>> {
        self.check_width("forest predict", features.len())?;
        Ok(self.trees.iter().map(|t| t.evaluate(features)).collect())
    }

    /// Mean over trees of the cover-weighted leaf average
    pub fn expected_value(&self) -> f64 {
        let sum: f64 = self.trees.iter().map(Tree::expected_value).sum();
        sum / self.trees.len() as f64
    }

    pub(crate) fn check_width(&self, context: &str, actual: usize) -> Result<()> {
        if actual != self.width {
            return Err(ValuationError::schema(context, self.width, actual));
        }
        Ok(())
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Encoded width the forest was fitted against
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn total_nodes(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }

    pub fn avg_depth(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: usize = self.trees.iter().map(Tree::depth).sum();
        total as f64 / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, (i % 4) as f64])
            .collect();
        let targets = rows.iter().map(|r| 2.0 * r[0] + r[1]).collect();
        (rows, targets)
    }

    fn params(tree_count: usize) -> ForestParams {
        ForestParams {
            tree_count,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_fit_predict() {
        let (rows, targets) = dataset();
        let forest = Forest::fit(&rows, &targets, &params(10)).unwrap();

        assert_eq!(forest.n_trees(), 10);
        assert_eq!(forest.width(), 2);
        let prediction = forest.predict(&[20.0, 0.0]).unwrap();
        assert!(prediction > 30.0 && prediction < 50.0);
    }

    #[test]
    fn test_prediction_is_tree_mean() {
        let (rows, targets) = dataset();
        let forest = Forest::fit(&rows, &targets, &params(5)).unwrap();
        let per_tree = forest.tree_predictions(&rows[7]).unwrap();
        let mean = per_tree.iter().sum::<f64>() / per_tree.len() as f64;
        assert_eq!(forest.predict(&rows[7]).unwrap(), mean);
    }

    #[test]
    fn test_same_seed_same_trees() {
        let (rows, targets) = dataset();
        let a = Forest::fit(&rows, &targets, &params(8)).unwrap();
        let b = Forest::fit(&rows, &targets, &params(8)).unwrap();
        assert_eq!(a, b);

        let other_seed = ForestParams {
            seed: 7,
            ..params(8)
        };
        let c = Forest::fit(&rows, &targets, &other_seed).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_wrong_width_is_schema_error() {
        let (rows, targets) = dataset();
        let forest = Forest::fit(&rows, &targets, &params(3)).unwrap();
        assert!(forest.predict(&[1.0]).unwrap_err().is_schema());
        assert!(forest.predict(&[1.0, 2.0, 3.0]).unwrap_err().is_schema());
    }

    #[test]
    fn test_bad_targets_rejected() {
        let (rows, mut targets) = dataset();
        targets[3] = f64::NAN;
        match Forest::fit(&rows, &targets, &params(3)) {
            Err(ValuationError::Data { field, .. }) => assert_eq!(field, "target"),
            other => panic!("expected data error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_ragged_inputs_rejected() {
        assert!(matches!(
            Forest::fit(&[], &[], &params(3)),
            Err(ValuationError::Training(_))
        ));

        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(Forest::fit(&rows, &[1.0, 2.0], &params(3))
            .unwrap_err()
            .is_schema());

        let (rows, targets) = dataset();
        assert!(matches!(
            Forest::fit(&rows, &targets, &params(0)),
            Err(ValuationError::Training(_))
        ));
    }

    #[test]
    fn test_from_trees_validates_split_features() {
        let tree = Tree::new(vec![
            Node::internal(3, 0.5, 1, 2, 1.5, 2.0),
            Node::leaf(1.0, 1.0),
            Node::leaf(2.0, 1.0),
        ]);
        assert!(Forest::from_trees(vec![tree.clone()], 2).is_err());
        assert!(Forest::from_trees(vec![tree], 4).is_ok());
    }
}
