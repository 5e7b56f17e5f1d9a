//! Training driver
//!
//! Runs the core pipeline on a loaded [`Dataset`] and writes the artifact.

use anyhow::{Context, Result};
use carvault_core::artifact::{self, SavedArtifact};
use carvault_core::{pipeline, vehicle_schema, FittedState, ValuationConfig};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::dataset::Dataset;

/// In-sample fit quality and artifact location of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub rows: usize,
    pub trees: usize,
    pub encoded_width: usize,
    pub rmse: f64,
    pub r_squared: f64,
    pub hash: String,
    pub bundle_size: usize,
}

/// Trains valuation models for one configuration
#[derive(Debug, Clone)]
pub struct ValuationTrainer {
    config: ValuationConfig,
}

impl ValuationTrainer {
    pub fn new(config: ValuationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// Fit a state on the dataset
    pub fn train(&self, dataset: &Dataset) -> Result<FittedState> {
        for warning in self.config.validate()? {
            warn!("{}", warning);
        }

        let mut config = self.config.clone();
        config.target_column = dataset.target_column.clone();

        let state = pipeline::fit(&vehicle_schema(), &dataset.records, &dataset.targets, &config)
            .context("Failed to fit valuation model")?;
        Ok(state)
    }

    /// Fit, score in-sample and save to `output`
    pub fn train_and_save(&self, dataset: &Dataset, output: &Path) -> Result<TrainingReport> {
        let state = self.train(dataset)?;
        let (rmse, r_squared) = in_sample_fit(&state, dataset)?;
        info!("In-sample RMSE {:.4}, R² {:.4}", rmse, r_squared);

        let saved: SavedArtifact =
            artifact::save(&state, output).context("Failed to write artifact")?;

        Ok(TrainingReport {
            rows: dataset.len(),
            trees: state.forest().n_trees(),
            encoded_width: state.spec().encoded_width(),
            rmse,
            r_squared,
            hash: saved.hash_hex,
            bundle_size: saved.bundle_size,
        })
    }
}

/// Root mean squared error and coefficient of determination on the
/// training rows
fn in_sample_fit(state: &FittedState, dataset: &Dataset) -> Result<(f64, f64)> {
    let n = dataset.len() as f64;
    let mean = dataset.targets.iter().sum::<f64>() / n;

    let mut sse = 0.0;
    let mut sst = 0.0;
    for (record, &target) in dataset.records.iter().zip(&dataset.targets) {
        let predicted = state.predict(record)?;
        sse += (target - predicted).powi(2);
        sst += (target - mean).powi(2);
    }

    let rmse = (sse / n).sqrt();
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { 1.0 };
    Ok((rmse, r_squared))
}
