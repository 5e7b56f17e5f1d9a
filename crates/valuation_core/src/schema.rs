//! Schema registry
//!
//! [`FeatureSchema`] is the declared, ordered list of model inputs.
//! [`FeatureSpec`] is that schema after fitting: it adds the numeric
//! statistics and the category sets observed in training, and from those
//! defines the canonical encoded layout. Both are immutable once built.
//!
//! Encoded layout: every numeric feature in declaration order, followed by
//! one one-hot block per categorical feature in declaration order, with the
//! categories of a block sorted lexicographically. Numeric columns are named
//! after their feature; one-hot columns are named `feature=category`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{Result, ValuationError};
use crate::record::{RawRecord, Row, Value};

/// Kind of a declared feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// Declared model input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    pub kind: FeatureKind,
    /// Reject negative values during validation (numeric features only)
    #[serde(default)]
    pub non_negative: bool,
}

impl FeatureDef {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric,
            non_negative: false,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
            non_negative: false,
        }
    }

    pub fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }
}

/// Ordered list of declared features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<FeatureDef>,
}

impl FeatureSchema {
    /// Build a schema; names must be unique and the list non-empty
    pub fn new(features: Vec<FeatureDef>) -> Result<Self> {
        if features.is_empty() {
            return Err(ValuationError::Config("schema declares no features".into()));
        }

        let mut seen = BTreeSet::new();
        for def in &features {
            if def.name.trim().is_empty() {
                return Err(ValuationError::Config("feature with empty name".into()));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(ValuationError::Config(format!(
                    "duplicate feature name `{}`",
                    def.name
                )));
            }
        }

        Ok(Self { features })
    }

    /// Build a schema from a fixed list whose names are known to be valid
    pub(crate) fn from_static(features: Vec<FeatureDef>) -> Self {
        debug_assert!(Self::new(features.clone()).is_ok());
        Self { features }
    }

    pub fn features(&self) -> &[FeatureDef] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn numeric(&self) -> impl Iterator<Item = &FeatureDef> {
        self.features
            .iter()
            .filter(|def| def.kind == FeatureKind::Numeric)
    }

    pub fn categorical(&self) -> impl Iterator<Item = &FeatureDef> {
        self.features
            .iter()
            .filter(|def| def.kind == FeatureKind::Categorical)
    }

    /// Check presence and type of every declared feature and return the
    /// values in declaration order. Fields not in the schema are ignored.
    pub fn validate(&self, record: &RawRecord) -> Result<Row> {
        let mut values = Vec::with_capacity(self.features.len());

        for def in &self.features {
            let field = record
                .get(&def.name)
                .ok_or_else(|| ValuationError::data(&def.name, "missing required field"))?;

            let value = match def.kind {
                FeatureKind::Numeric => {
                    let number = field.as_number().ok_or_else(|| {
                        ValuationError::data(
                            &def.name,
                            format!("expected a finite number, got {field:?}"),
                        )
                    })?;
                    if def.non_negative && number < 0.0 {
                        return Err(ValuationError::data(
                            &def.name,
                            format!("must be non-negative, got {number}"),
                        ));
                    }
                    Value::Numeric(number)
                }
                FeatureKind::Categorical => {
                    let text = field.as_text().ok_or_else(|| {
                        ValuationError::data(&def.name, format!("expected text, got {field:?}"))
                    })?;
                    if text.is_empty() {
                        return Err(ValuationError::data(&def.name, "empty category value"));
                    }
                    Value::Categorical(text.to_string())
                }
            };
            values.push(value);
        }

        Ok(Row::new(values))
    }
}

/// Fit-time statistics of a numeric feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub name: String,
    pub mean: f64,
    /// Population standard deviation; zero marks a constant feature
    pub std_dev: f64,
}

/// Categories observed for a categorical feature, sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBlock {
    pub name: String,
    pub categories: Vec<String>,
}

impl CategoryBlock {
    /// Position of `category` inside the block, if it was seen during fit
    pub fn position(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|known| known.as_str().cmp(category))
            .ok()
    }
}

/// One column of the encoded layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedColumn {
    pub name: String,
    /// Index of the declared feature this column comes from
    pub source: usize,
}

/// Fitted schema registry; the single source of truth for encoded layout and naming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    schema: FeatureSchema,
    numeric: Vec<NumericStats>,
    categorical: Vec<CategoryBlock>,
}

impl FeatureSpec {
    /// Assemble a spec from fitted parts. Stats and blocks must follow the
    /// declaration order of the schema's numeric and categorical features.
    pub fn from_parts(
        schema: FeatureSchema,
        numeric: Vec<NumericStats>,
        mut categorical: Vec<CategoryBlock>,
    ) -> Result<Self> {
        for block in &mut categorical {
            block.categories.sort();
            block.categories.dedup();
        }

        let spec = Self {
            schema,
            numeric,
            categorical,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check stats and blocks against the schema, and that every block is
    /// sorted without duplicates. Deserialized specs skip [`Self::from_parts`],
    /// so loaders must call this before encoding.
    pub fn validate(&self) -> Result<()> {
        let declared_numeric: Vec<&str> = self.schema.numeric().map(|d| d.name.as_str()).collect();
        let fitted_numeric: Vec<&str> = self.numeric.iter().map(|s| s.name.as_str()).collect();
        if declared_numeric != fitted_numeric {
            return Err(ValuationError::schema(
                "numeric statistics",
                declared_numeric.len(),
                fitted_numeric.len(),
            ));
        }

        let declared_categorical: Vec<&str> =
            self.schema.categorical().map(|d| d.name.as_str()).collect();
        let fitted_categorical: Vec<&str> =
            self.categorical.iter().map(|b| b.name.as_str()).collect();
        if declared_categorical != fitted_categorical {
            return Err(ValuationError::schema(
                "category blocks",
                declared_categorical.len(),
                fitted_categorical.len(),
            ));
        }

        for block in &self.categorical {
            if let Some(i) = block.categories.windows(2).position(|w| w[0] >= w[1]) {
                let category = &block.categories[i + 1];
                let sorted_at = block
                    .categories
                    .iter()
                    .filter(|known| *known < category)
                    .count();
                return Err(ValuationError::schema(
                    format!("category block `{}` at `{}`", block.name, category),
                    sorted_at,
                    i + 1,
                ));
            }
        }

        Ok(())
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn numeric(&self) -> &[NumericStats] {
        &self.numeric
    }

    pub fn categorical(&self) -> &[CategoryBlock] {
        &self.categorical
    }

    /// Length of every encoded vector produced against this spec
    pub fn encoded_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|block| block.categories.len())
                .sum::<usize>()
    }

    /// Encoded columns in canonical order
    pub fn columns(&self) -> Vec<EncodedColumn> {
        let source_of = |name: &str| {
            self.schema
                .features()
                .iter()
                .position(|def| def.name == name)
                .unwrap_or(0)
        };

        let mut columns = Vec::with_capacity(self.encoded_width());
        for stats in &self.numeric {
            columns.push(EncodedColumn {
                name: stats.name.clone(),
                source: source_of(&stats.name),
            });
        }
        for block in &self.categorical {
            let source = source_of(&block.name);
            for category in &block.categories {
                columns.push(EncodedColumn {
                    name: format!("{}={}", block.name, category),
                    source,
                });
            }
        }
        columns
    }

    pub fn encoded_names(&self) -> Vec<String> {
        self.columns().into_iter().map(|c| c.name).collect()
    }
}
