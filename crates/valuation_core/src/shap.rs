//! Exact tree-SHAP attribution
//!
//! Computes the Shapley value of every encoded feature for one record,
//! where the value of a feature subset S is the expected tree output when
//! only the features in S are known and the rest are marginalized using
//! node covers. Instead of enumerating all 2^M subsets, one recursive walk
//! per tree keeps the unique features on the current decision path together
//! with the proportion of subsets of every size that reach the node. At a
//! leaf, unwinding one feature from that path yields its weighted share of
//! the leaf value.
//!
//! Per path element:
//! - `zero_fraction`: share of samples that follow the path when the
//!   feature is unknown (product of child/parent covers)
//! - `one_fraction`: 1 when the record itself follows the path, else 0
//! - `pweight`: proportion of subsets of a given size that pass through
//!
//! A feature that appears twice on a path is unwound and extended again
//! with the combined fractions, so each feature occupies one element.
//!
//! Forest attributions are the mean of the per-tree attributions, which
//! keeps `baseline + Σ contributions == prediction` for the ensemble.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{Result, ValuationError};
use crate::forest::Forest;
use crate::schema::FeatureSpec;
use crate::tree::Tree;

/// Contribution of one encoded column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    /// Encoded column name, e.g. `car_age` or `fuel_type=Diesel`
    pub name: String,
    /// Declared feature the column belongs to
    pub feature: String,
    /// Position in the encoded layout
    pub index: usize,
    pub value: f64,
}

/// Contribution summed over all columns of one declared feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedContribution {
    pub feature: String,
    pub value: f64,
}

/// Additive explanation of one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Expected forest output with no features known
    pub baseline: f64,
    pub prediction: f64,
    /// One entry per encoded column, in layout order
    pub contributions: Vec<FeatureContribution>,
}

impl AttributionResult {
    /// Sum of all contributions
    pub fn total(&self) -> f64 {
        self.contributions.iter().map(|c| c.value).sum()
    }

    /// `|baseline + Σ contributions - prediction|`
    pub fn local_accuracy_gap(&self) -> f64 {
        (self.baseline + self.total() - self.prediction).abs()
    }

    /// Whether the contributions reconstruct the prediction within a
    /// relative tolerance (absolute for predictions smaller than 1)
    pub fn is_locally_accurate(&self, rel_tol: f64) -> bool {
        self.local_accuracy_gap() <= rel_tol * self.prediction.abs().max(1.0)
    }

    /// Contribution of an encoded column by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.contributions
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    /// Contributions ordered by decreasing magnitude
    pub fn ranked(&self) -> Vec<&FeatureContribution> {
        let mut ranked: Vec<&FeatureContribution> = self.contributions.iter().collect();
        ranked.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        ranked
    }

    /// One-hot columns folded back into their declared feature, in order of
    /// first appearance in the layout
    pub fn grouped(&self) -> Vec<GroupedContribution> {
        let mut order: Vec<&str> = Vec::new();
        let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
        for c in &self.contributions {
            let entry = sums.entry(c.feature.as_str()).or_insert_with(|| {
                order.push(c.feature.as_str());
                0.0
            });
            *entry += c.value;
        }
        order
            .into_iter()
            .map(|feature| GroupedContribution {
                feature: feature.to_string(),
                value: sums[feature],
            })
            .collect()
    }
}

/// Attribute a forest prediction for one encoded record
pub fn attribute(encoded: &[f64], spec: &FeatureSpec, forest: &Forest) -> Result<AttributionResult> {
    if spec.encoded_width() != forest.width() {
        return Err(ValuationError::schema(
            "feature spec layout",
            forest.width(),
            spec.encoded_width(),
        ));
    }
    forest.check_width("attribution input", encoded.len())?;

    let mut phi = vec![0.0; forest.width()];
    for tree in forest.trees() {
        accumulate_tree_shap(tree, encoded, &mut phi);
    }
    let n_trees = forest.n_trees() as f64;
    for value in &mut phi {
        *value /= n_trees;
    }

    let contributions = spec
        .columns()
        .into_iter()
        .zip(phi)
        .enumerate()
        .map(|(index, (column, value))| FeatureContribution {
            feature: spec.schema().features()[column.source].name.clone(),
            name: column.name,
            index,
            value,
        })
        .collect();

    Ok(AttributionResult {
        baseline: forest.expected_value(),
        prediction: forest.predict(encoded)?,
        contributions,
    })
}

/// Shapley values of a single tree; `features` must match the tree's width
pub fn tree_shap(tree: &Tree, features: &[f64]) -> Vec<f64> {
    let mut phi = vec![0.0; features.len()];
    accumulate_tree_shap(tree, features, &mut phi);
    phi
}

fn accumulate_tree_shap(tree: &Tree, features: &[f64], phi: &mut [f64]) {
    if tree.nodes.is_empty() {
        return;
    }
    recurse(tree, features, phi, 0, &[], 1.0, 1.0, None);
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    features: &[f64],
    phi: &mut [f64],
    node_idx: usize,
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = Vec::with_capacity(parent_path.len() + 1);
    path.extend_from_slice(parent_path);
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    let node = &tree.nodes[node_idx];
    if node.is_leaf() {
        for i in 1..path.len() {
            let weight = unwound_path_sum(&path, i);
            let el = path[i];
            if let Some(f) = el.feature {
                phi[f] += weight * (el.one_fraction - el.zero_fraction) * node.value;
            }
        }
        return;
    }

    let split = node.feature_idx as usize;
    let hot = node.next(features[split]);
    let cold = if hot == node.left as usize {
        node.right as usize
    } else {
        node.left as usize
    };
    let hot_zero_fraction = tree.nodes[hot].cover / node.cover;
    let cold_zero_fraction = tree.nodes[cold].cover / node.cover;

    // Undo an earlier split on the same feature so it can be redone here
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(pos) = path.iter().position(|el| el.feature == Some(split)) {
        incoming_zero = path[pos].zero_fraction;
        incoming_one = path[pos].one_fraction;
        unwind_path(&mut path, pos);
    }

    recurse(
        tree,
        features,
        phi,
        hot,
        &path,
        hot_zero_fraction * incoming_zero,
        incoming_one,
        Some(split),
    );
    recurse(
        tree,
        features,
        phi,
        cold,
        &path,
        cold_zero_fraction * incoming_zero,
        0.0,
        Some(split),
    );
}

/// Append a feature to the path and update subset proportions
fn extend_path(
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if path.is_empty() { 1.0 } else { 0.0 },
    });

    let depth = path.len() - 1;
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

/// Remove the element at `path_index`, inverting its `extend_path`
fn unwind_path(path: &mut Vec<PathElement>, path_index: usize) {
    let depth = path.len() - 1;
    let denom = (depth + 1) as f64;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one_fraction);
            next_one_portion =
                tmp - path[i].pweight * zero_fraction * (depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in path_index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total pweight the path would have with `path_index` unwound
fn unwound_path_sum(path: &[PathElement], path_index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next_one_portion / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (depth - i) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].pweight / (zero_fraction * (depth - i) as f64);
        }
    }

    total * (depth + 1) as f64
}
