//! Carvault trainer - offline training and explanation tooling
//!
//! Loads vehicle listings from CSV, fits the valuation pipeline and writes
//! hash-verified artifacts that the `carvault` binary can explain from.

pub mod dataset;
pub mod errors;
pub mod trainer;

use carvault_core::{FittedState, ValuationConfig};
use std::path::Path;

pub use dataset::{canonical_column, normalize_header, Dataset, FEATURE_COLUMNS};
pub use errors::TrainerError;
pub use trainer::{TrainingReport, ValuationTrainer};

/// Fit a valuation model directly from a CSV file.
pub fn train_pipeline_from_csv(
    path: &Path,
    config: ValuationConfig,
) -> Result<FittedState, TrainerError> {
    let dataset = Dataset::from_csv(path, &config.target_column)
        .map_err(|err| TrainerError::classify(err, TrainerError::Dataset))?;
    ValuationTrainer::new(config)
        .train(&dataset)
        .map_err(|err| TrainerError::classify(err, TrainerError::Training))
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
