//! Valuation pipeline
//!
//! Training runs validate → fit encoder → encode → fit forest and produces
//! a [`FittedState`]. Serving holds the current state behind a lock that is
//! only taken long enough to clone an `Arc`, so every query sees one
//! consistent state and a reload never blocks explanations in flight.

use chrono::Utc;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::artifact;
use crate::config::ValuationConfig;
use crate::encoder;
use crate::errors::{Result, ValuationError};
use crate::forest::Forest;
use crate::record::RawRecord;
use crate::schema::FeatureSchema;
use crate::state::{Explanation, FittedState, StateMetadata, STATE_FORMAT_VERSION};
use crate::vehicle::{VehicleListing, VehicleRecord};

/// Fit encoder and forest on raw training records
#[instrument(skip_all, fields(rows = records.len()))]
pub fn fit(
    schema: &FeatureSchema,
    records: &[RawRecord],
    targets: &[f64],
    config: &ValuationConfig,
) -> Result<FittedState> {
    config
        .forest
        .validate()
        .map_err(|e| ValuationError::Training(e.to_string()))?;
    if records.len() != targets.len() {
        return Err(ValuationError::Training(format!(
            "{} records but {} targets",
            records.len(),
            targets.len()
        )));
    }

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            schema.validate(record).map_err(|err| match err {
                ValuationError::Data { field, reason } => {
                    ValuationError::data(field, format!("row {}: {}", i + 1, reason))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let spec = encoder::fit(schema, &rows)?;
    let encoded: Vec<Vec<f64>> = encoder::transform_batch(&rows, &spec)?
        .into_iter()
        .map(|e| e.into_vec())
        .collect();
    let forest = Forest::fit(&encoded, targets, &config.forest)?;

    let metadata = StateMetadata {
        format_version: STATE_FORMAT_VERSION,
        created_at: Utc::now().timestamp(),
        training_rows: records.len(),
        reference_year: config.reference_year,
        target_column: config.target_column.clone(),
        params: config.forest.clone(),
    };
    let state = FittedState::new(spec, forest, metadata)?;
    info!(
        "Pipeline fitted on {} rows: {} trees over {} encoded columns",
        records.len(),
        state.forest().n_trees(),
        state.spec().encoded_width()
    );
    Ok(state)
}

/// Serves predictions and explanations from a swappable fitted state
#[derive(Debug)]
pub struct ValuationPipeline {
    state: RwLock<Arc<FittedState>>,
}

impl ValuationPipeline {
    pub fn new(state: FittedState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    /// Fit a state without serving it; see [`fit`]
    pub fn fit(
        schema: &FeatureSchema,
        records: &[RawRecord],
        targets: &[f64],
        config: &ValuationConfig,
    ) -> Result<FittedState> {
        fit(schema, records, targets, config)
    }

    /// Fit a state and serve it
    pub fn train(
        schema: &FeatureSchema,
        records: &[RawRecord],
        targets: &[f64],
        config: &ValuationConfig,
    ) -> Result<Self> {
        Ok(Self::new(fit(schema, records, targets, config)?))
    }

    /// Serve the artifact stored in `dir`
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Ok(Self::new(artifact::load(dir)?))
    }

    /// Current state; later reloads do not affect the returned handle
    pub fn snapshot(&self) -> Arc<FittedState> {
        Arc::clone(&self.state.read())
    }

    /// Swap in a new state and return the previous one
    pub fn reload(&self, state: FittedState) -> Arc<FittedState> {
        let next = Arc::new(state);
        let mut guard = self.state.write();
        let previous = std::mem::replace(&mut *guard, next);
        info!(
            "Pipeline reloaded: {} trees over {} encoded columns",
            guard.forest().n_trees(),
            guard.spec().encoded_width()
        );
        previous
    }

    /// Load, verify and swap in the artifact stored in `dir`
    pub fn reload_from<P: AsRef<Path>>(&self, dir: P) -> Result<Arc<FittedState>> {
        let state = artifact::load(dir)?;
        Ok(self.reload(state))
    }

    /// Persist the current state
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<artifact::SavedArtifact> {
        artifact::save(&self.snapshot(), dir)
    }

    pub fn predict(&self, record: &RawRecord) -> Result<f64> {
        self.snapshot().predict(record)
    }

    pub fn explain(&self, record: &RawRecord) -> Result<Explanation> {
        self.snapshot().explain(record)
    }

    /// Explain many records against one snapshot; results keep input order
    pub fn explain_batch(&self, records: &[RawRecord]) -> Vec<Result<Explanation>> {
        let state = self.snapshot();
        records
            .par_iter()
            .map(|record| state.explain(record))
            .collect()
    }

    pub fn explain_vehicle(&self, vehicle: &VehicleRecord) -> Result<Explanation> {
        self.explain(&vehicle.to_raw())
    }

    /// Explain a listing, deriving its age from the reference year the
    /// serving state was trained with
    pub fn explain_listing(&self, listing: VehicleListing) -> Result<Explanation> {
        let state = self.snapshot();
        let vehicle = listing.into_record(state.metadata().reference_year)?;
        state.explain(&vehicle.to_raw())
    }

    pub fn reference_year(&self) -> i32 {
        self.state.read().metadata().reference_year
    }
}
