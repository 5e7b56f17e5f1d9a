//! CSV dataset loading
//!
//! Reads vehicle listings with a header row. Header names are normalized
//! before matching, so the headers of the published listings export
//! (`KM Driven`, `Model_Only`, `Selling Price (in Lakhs)`, ...) resolve to
//! the feature names of the vehicle schema. Feature cells are passed on as
//! text and typed by schema validation at fit time; the target is parsed
//! here so a bad price can be reported with its line number.

use anyhow::{Context, Result};
use carvault_core::record::FieldValue;
use carvault_core::vehicle::{
    BRAND, CAR_AGE, FUEL_TYPE, KM_DRIVEN, MODEL, OWNERSHIP, TRANSMISSION_TYPE,
};
use carvault_core::{RawRecord, ValuationError};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Feature columns every dataset must provide
pub const FEATURE_COLUMNS: [&str; 7] = [
    KM_DRIVEN,
    FUEL_TYPE,
    TRANSMISSION_TYPE,
    OWNERSHIP,
    BRAND,
    MODEL,
    CAR_AGE,
];

const NUMERIC_COLUMNS: [&str; 3] = [KM_DRIVEN, OWNERSHIP, CAR_AGE];

/// Normalized header spellings that map onto a different column name
const ALIASES: [(&str, &str); 3] = [
    ("model_only", MODEL),
    ("selling_price_in_lakhs", "selling_price"),
    ("kms_driven", KM_DRIVEN),
];

/// Normalize a header cell: trim, drop stray line breaks, lowercase, map
/// runs of non-alphanumerics to a single `_` and trim underscores
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars().filter(|c| *c != '\r' && *c != '\n') {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

/// Resolve a raw header to the column name used by the schema
pub fn canonical_column(raw: &str) -> String {
    let normalized = normalize_header(raw);
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, name)| name.to_string())
        .unwrap_or(normalized)
}

/// Training dataset: raw feature records and their prices
#[derive(Clone, Debug)]
pub struct Dataset {
    pub records: Vec<RawRecord>,
    pub targets: Vec<f64>,
    pub target_column: String,
}

impl Dataset {
    /// Load a dataset from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, target_column: &str) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
        Self::from_reader(file, target_column)
    }

    /// Load a dataset from any CSV source with a header row
    pub fn from_reader<R: Read>(reader: R, target_column: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(canonical_column)
            .collect();

        let target_name = canonical_column(target_column);
        let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
        for required in FEATURE_COLUMNS.iter().copied().chain([target_name.as_str()]) {
            let idx = headers
                .iter()
                .position(|h| h == required)
                .with_context(|| {
                    format!("Missing required column `{required}` (found: {})", headers.join(", "))
                })?;
            positions.insert(required, idx);
        }
        let target_idx = positions[target_name.as_str()];

        let mut records = Vec::new();
        let mut targets = Vec::new();

        for result in rdr.records() {
            let row = result.context("Malformed CSV row")?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);

            let mut record = RawRecord::new();
            for column in FEATURE_COLUMNS {
                let cell = row.get(positions[column]).unwrap_or("");
                record.insert(column, FieldValue::Text(cell.to_string()));
            }

            let raw_target = row.get(target_idx).unwrap_or("");
            let target = raw_target
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| {
                    ValuationError::data(
                        target_name.as_str(),
                        format!("line {line}: invalid target value `{raw_target}`"),
                    )
                })?;

            records.push(record);
            targets.push(target);
        }

        if records.is_empty() {
            anyhow::bail!("Dataset is empty");
        }

        Ok(Self {
            records,
            targets,
            target_column: target_name,
        })
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smallest and largest target
    pub fn target_range(&self) -> (f64, f64) {
        self.targets
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
                (lo.min(t), hi.max(t))
            })
    }

    /// Min and max of each numeric feature over the cells that parse
    pub fn feature_stats(&self) -> Vec<(&'static str, f64, f64)> {
        NUMERIC_COLUMNS
            .iter()
            .map(|&column| {
                let (lo, hi) = self
                    .records
                    .iter()
                    .filter_map(|r| r.get(column).and_then(FieldValue::as_number))
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    });
                (column, lo, hi)
            })
            .collect()
    }
}
