//! Fitted state: everything inference needs, produced once by training

use serde::{Deserialize, Serialize};

use crate::encoder::{self, EncodedRecord};
use crate::errors::{Result, ValuationError};
use crate::forest::{Forest, ForestParams};
use crate::record::RawRecord;
use crate::schema::FeatureSpec;
use crate::shap::{self, AttributionResult};

/// Version of the fitted-state layout written to artifacts
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Facts about how a fitted state was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub format_version: u32,
    /// Unix timestamp (seconds) of the fit
    pub created_at: i64,
    pub training_rows: usize,
    /// Year used to derive car ages from model years at training time
    pub reference_year: i32,
    /// Training target column
    pub target_column: String,
    pub params: ForestParams,
}

/// A prediction together with its additive explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub prediction: f64,
    pub attribution: AttributionResult,
}

/// Fitted encoder spec and forest, immutable after construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedState {
    spec: FeatureSpec,
    forest: Forest,
    metadata: StateMetadata,
}

impl FittedState {
    /// Bundle a spec and a forest; their encoded widths must agree
    pub fn new(spec: FeatureSpec, forest: Forest, metadata: StateMetadata) -> Result<Self> {
        let state = Self {
            spec,
            forest,
            metadata,
        };
        state.validate()?;
        Ok(state)
    }

    /// Check the spec's own invariants, then the forest against the
    /// encoded feature layout
    pub fn validate(&self) -> Result<()> {
        if self.metadata.format_version != STATE_FORMAT_VERSION {
            return Err(ValuationError::Artifact(format!(
                "unsupported state format version {}",
                self.metadata.format_version
            )));
        }
        self.spec.validate()?;
        if self.spec.encoded_width() != self.forest.width() {
            return Err(ValuationError::schema(
                "fitted state layout",
                self.spec.encoded_width(),
                self.forest.width(),
            ));
        }
        self.forest.validate()
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn metadata(&self) -> &StateMetadata {
        &self.metadata
    }

    /// Validate and encode one raw record
    pub fn encode(&self, record: &RawRecord) -> Result<EncodedRecord> {
        let row = self.spec.schema().validate(record)?;
        encoder::transform(&row, &self.spec)
    }

    pub fn predict(&self, record: &RawRecord) -> Result<f64> {
        let encoded = self.encode(record)?;
        self.forest.predict(encoded.as_slice())
    }

    /// Encode, predict and attribute one record
    pub fn explain(&self, record: &RawRecord) -> Result<Explanation> {
        let encoded = self.encode(record)?;
        let attribution = shap::attribute(encoded.as_slice(), &self.spec, &self.forest)?;
        Ok(Explanation {
            prediction: attribution.prediction,
            attribution,
        })
    }
}
