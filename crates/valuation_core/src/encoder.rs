//! Feature encoder
//!
//! Standardizes numeric features with fit-time statistics and expands
//! categorical features into one-hot blocks. Both directions are pure
//! functions of their inputs: fitting produces a [`FeatureSpec`], and
//! transforming a row against the same spec always yields the same bits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

use crate::errors::{Result, ValuationError};
use crate::record::{Row, Value};
use crate::schema::{CategoryBlock, FeatureKind, FeatureSchema, FeatureSpec, NumericStats};

/// Fixed-width numeric vector in the canonical layout of a [`FeatureSpec`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRecord {
    values: Vec<f64>,
}

impl EncodedRecord {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

/// Learn numeric statistics and category sets from validated training rows
#[instrument(skip(schema, rows), fields(rows = rows.len()))]
pub fn fit(schema: &FeatureSchema, rows: &[Row]) -> Result<FeatureSpec> {
    if rows.is_empty() {
        return Err(ValuationError::Training(
            "cannot fit encoder on an empty dataset".into(),
        ));
    }

    for row in rows {
        if row.len() != schema.len() {
            return Err(ValuationError::schema("encoder fit row", schema.len(), row.len()));
        }
    }

    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    for (idx, def) in schema.features().iter().enumerate() {
        match def.kind {
            FeatureKind::Numeric => {
                let column = rows
                    .iter()
                    .map(|row| match &row.values()[idx] {
                        Value::Numeric(v) => Ok(*v),
                        Value::Categorical(_) => {
                            Err(ValuationError::data(&def.name, "expected a numeric value"))
                        }
                    })
                    .collect::<Result<Vec<f64>>>()?;
                numeric.push(numeric_stats(&def.name, &column));
            }
            FeatureKind::Categorical => {
                let mut categories = BTreeSet::new();
                for row in rows {
                    match &row.values()[idx] {
                        Value::Categorical(c) => {
                            categories.insert(c.clone());
                        }
                        Value::Numeric(_) => {
                            return Err(ValuationError::data(&def.name, "expected a category"))
                        }
                    }
                }
                categorical.push(CategoryBlock {
                    name: def.name.clone(),
                    categories: categories.into_iter().collect(),
                });
            }
        }
    }

    let spec = FeatureSpec::from_parts(schema.clone(), numeric, categorical)?;
    info!(
        "Encoder fitted: {} numeric, {} categorical, encoded width {}",
        spec.numeric().len(),
        spec.categorical().len(),
        spec.encoded_width()
    );
    Ok(spec)
}

/// Mean and population standard deviation. A column whose values are all
/// equal gets an exact zero deviation so it encodes as constant zero.
fn numeric_stats(name: &str, column: &[f64]) -> NumericStats {
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;

    let constant = column.windows(2).all(|w| w[0] == w[1]);
    let std_dev = if constant {
        0.0
    } else {
        let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt()
    };

    NumericStats {
        name: name.to_string(),
        mean,
        std_dev,
    }
}

/// Encode a validated row into the canonical layout of `spec`
pub fn transform(row: &Row, spec: &FeatureSpec) -> Result<EncodedRecord> {
    let schema = spec.schema();
    if row.len() != schema.len() {
        return Err(ValuationError::schema("encoder input row", schema.len(), row.len()));
    }

    let mut encoded = vec![0.0; spec.encoded_width()];
    let mut numeric_idx = 0;
    let mut block_idx = 0;
    let mut block_offset = spec.numeric().len();

    for (def, value) in schema.features().iter().zip(row.values()) {
        match (def.kind, value) {
            (FeatureKind::Numeric, Value::Numeric(x)) => {
                let stats = &spec.numeric()[numeric_idx];
                encoded[numeric_idx] = if stats.std_dev > 0.0 {
                    (x - stats.mean) / stats.std_dev
                } else {
                    0.0
                };
                numeric_idx += 1;
            }
            (FeatureKind::Categorical, Value::Categorical(category)) => {
                let block = &spec.categorical()[block_idx];
                match block.position(category) {
                    Some(pos) => encoded[block_offset + pos] = 1.0,
                    None => debug!(
                        feature = %block.name,
                        category = %category,
                        "unseen category, leaving indicator block empty"
                    ),
                }
                block_offset += block.categories.len();
                block_idx += 1;
            }
            (FeatureKind::Numeric, _) => {
                return Err(ValuationError::data(&def.name, "expected a numeric value"))
            }
            (FeatureKind::Categorical, _) => {
                return Err(ValuationError::data(&def.name, "expected a category"))
            }
        }
    }

    Ok(EncodedRecord::new(encoded))
}

/// Encode many rows against the same spec
pub fn transform_batch(rows: &[Row], spec: &FeatureSpec) -> Result<Vec<EncodedRecord>> {
    rows.iter().map(|row| transform(row, spec)).collect()
}
