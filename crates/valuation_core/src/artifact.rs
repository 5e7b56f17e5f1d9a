//! Fitted-state artifacts
//!
//! A saved model is a directory holding three files:
//! - `carvault.bin`: the bincode-encoded [`FittedState`]
//! - `carvault.hash`: hex BLAKE3 digest of `carvault.bin`
//! - `carvault.meta.json`: canonical JSON summary for humans and tooling
//!
//! Loading recomputes the digest before decoding when the hash file is
//! present, then re-validates the
//! forest against the encoded feature layout.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{Result, ValuationError};
use crate::forest::ForestParams;
use crate::serde_canon::to_canonical_json_pretty;
use crate::state::FittedState;

pub const BUNDLE_FILE: &str = "carvault.bin";
pub const HASH_FILE: &str = "carvault.hash";
pub const META_FILE: &str = "carvault.meta.json";

/// Paths and digest of a written artifact
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub bundle_path: PathBuf,
    pub hash_path: PathBuf,
    pub meta_path: PathBuf,
    pub hash_hex: String,
    pub bundle_size: usize,
}

/// Human-readable description written next to the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub hash: String,
    pub format_version: u32,
    pub created_at: String,
    pub training_rows: usize,
    pub reference_year: i32,
    pub target_column: String,
    pub params: ForestParams,
    pub encoded_columns: Vec<String>,
    pub n_trees: usize,
    pub total_nodes: usize,
    pub avg_depth: f64,
}

impl ArtifactSummary {
    pub fn describe(state: &FittedState, hash: &str) -> Self {
        let metadata = state.metadata();
        let created_at = Utc
            .timestamp_opt(metadata.created_at, 0)
            .single()
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| metadata.created_at.to_string());

        Self {
            hash: hash.to_string(),
            format_version: metadata.format_version,
            created_at,
            training_rows: metadata.training_rows,
            reference_year: metadata.reference_year,
            target_column: metadata.target_column.clone(),
            params: metadata.params.clone(),
            encoded_columns: state.spec().encoded_names(),
            n_trees: state.forest().n_trees(),
            total_nodes: state.forest().total_nodes(),
            avg_depth: state.forest().avg_depth(),
        }
    }
}

/// Encode a fitted state to bytes
pub fn to_bytes(state: &FittedState) -> Result<Vec<u8>> {
    Ok(bincode::serialize(state)?)
}

/// Decode and validate a fitted state
pub fn from_bytes(bytes: &[u8]) -> Result<FittedState> {
    let state: FittedState = bincode::deserialize(bytes)?;
    state.validate()?;
    Ok(state)
}

/// Hex BLAKE3 digest of encoded bytes
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Write the bundle, its digest and its summary into `dir`
pub fn save<P: AsRef<Path>>(state: &FittedState, dir: P) -> Result<SavedArtifact> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let bytes = to_bytes(state)?;
    let hash_hex = digest(&bytes);

    let bundle_path = dir.join(BUNDLE_FILE);
    let hash_path = dir.join(HASH_FILE);
    let meta_path = dir.join(META_FILE);

    fs::write(&bundle_path, &bytes)?;
    fs::write(&hash_path, format!("{hash_hex}\n"))?;
    let summary = ArtifactSummary::describe(state, &hash_hex);
    fs::write(&meta_path, to_canonical_json_pretty(&summary)?)?;

    info!(
        "Artifact written to {} ({} bytes, blake3 {})",
        dir.display(),
        bytes.len(),
        hash_hex
    );

    Ok(SavedArtifact {
        bundle_path,
        hash_path,
        meta_path,
        hash_hex,
        bundle_size: bytes.len(),
    })
}

/// Read, verify and decode the artifact in `dir`
pub fn load<P: AsRef<Path>>(dir: P) -> Result<FittedState> {
    let dir = dir.as_ref();
    let bundle_path = dir.join(BUNDLE_FILE);
    let hash_path = dir.join(HASH_FILE);

    let bytes = fs::read(&bundle_path).map_err(|e| {
        ValuationError::Artifact(format!("cannot read {}: {e}", bundle_path.display()))
    })?;

    if hash_path.exists() {
        let expected = fs::read_to_string(&hash_path).map_err(|e| {
            ValuationError::Artifact(format!("cannot read {}: {e}", hash_path.display()))
        })?;
        let actual = digest(&bytes);
        if expected.trim() != actual {
            return Err(ValuationError::Artifact(format!(
                "integrity check failed for {}: expected {}, computed {}",
                bundle_path.display(),
                expected.trim(),
                actual
            )));
        }
        debug!("Artifact digest verified: {}", actual);
    } else {
        warn!(
            "No {} next to {}, skipping integrity check",
            HASH_FILE,
            bundle_path.display()
        );
    }

    let state = from_bytes(&bytes)?;
    info!(
        "Artifact loaded from {}: {} trees, encoded width {}",
        dir.display(),
        state.forest().n_trees(),
        state.spec().encoded_width()
    );
    Ok(state)
}

/// Read the JSON summary of the artifact in `dir`
pub fn read_summary<P: AsRef<Path>>(dir: P) -> Result<ArtifactSummary> {
    let content = fs::read_to_string(dir.as_ref().join(META_FILE))?;
    Ok(serde_json::from_str(&content)?)
}
