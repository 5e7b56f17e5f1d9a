//! Valuation configuration
//!
//! Loaded from TOML, overridable from `CARVAULT_*` environment variables.
//!
//! ```toml
//! reference_year = 2025
//! target_column = "selling_price"
//! artifact_dir = "models/carvault"
//!
//! [forest]
//! tree_count = 100
//! max_depth = 12
//! min_samples_split = 2
//! min_samples_leaf = 1
//! seed = 42
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::{Result, ValuationError};
use crate::forest::ForestParams;
use crate::vehicle::{DEFAULT_REFERENCE_YEAR, SELLING_PRICE};

/// Earliest reference year accepted without a warning
const MIN_PLAUSIBLE_YEAR: i32 = 1950;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Year that model years are subtracted from to get the car age.
    /// Stored with the fitted state so inference uses the training value.
    pub reference_year: i32,
    /// Column holding the price to learn
    pub target_column: String,
    /// Directory the fitted-state artifact is written to
    pub artifact_dir: PathBuf,
    /// Forest training parameters
    pub forest: ForestParams,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            reference_year: DEFAULT_REFERENCE_YEAR,
            target_column: SELLING_PRICE.to_string(),
            artifact_dir: PathBuf::from("models/carvault"),
            forest: ForestParams::default(),
        }
    }
}

impl ValuationConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ValuationConfig = toml::from_str(&content)
            .map_err(|e| ValuationError::Config(format!("failed to parse config: {e}")))?;
        info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ValuationError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply `CARVAULT_*` environment overrides
    pub fn load_from_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; used by [`Self::load_from_env`]
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CARVAULT_REFERENCE_YEAR") {
            self.reference_year = parse_override("CARVAULT_REFERENCE_YEAR", &val)?;
        }
        if let Some(val) = lookup("CARVAULT_TREES") {
            self.forest.tree_count = parse_override("CARVAULT_TREES", &val)?;
        }
        if let Some(val) = lookup("CARVAULT_MAX_DEPTH") {
            self.forest.max_depth = match val.trim() {
                "" | "none" => None,
                depth => Some(parse_override("CARVAULT_MAX_DEPTH", depth)?),
            };
        }
        if let Some(val) = lookup("CARVAULT_SEED") {
            self.forest.seed = parse_override("CARVAULT_SEED", &val)?;
        }
        Ok(())
    }

    /// Validate configuration. Unusable values are errors; suspicious ones
    /// come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        self.forest.validate()?;

        let mut warnings = Vec::new();
        if self.reference_year < MIN_PLAUSIBLE_YEAR {
            warnings.push(format!(
                "Reference year {} looks implausible, car ages will be inflated",
                self.reference_year
            ));
        }
        if self.target_column.trim().is_empty() {
            return Err(ValuationError::Config("target_column must not be empty".into()));
        }
        if self.forest.tree_count < 10 {
            warnings.push(format!(
                "Only {} trees configured, predictions will be noisy",
                self.forest.tree_count
            ));
        }
        if self.forest.max_depth.is_none() && self.forest.min_samples_leaf == 1 {
            warnings.push("Unbounded depth with single-sample leaves, trees may grow large".into());
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }

        Ok(warnings)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ValuationError::Config(format!("{key}: invalid value `{value}`")))
}
