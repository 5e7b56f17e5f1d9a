//! Error types for the valuation core

use thiserror::Error;

/// Errors that can occur while fitting, loading or querying a valuation model
#[derive(Error, Debug)]
pub enum ValuationError {
    /// Encoded vector width or layout disagrees with the fitted state.
    /// Always fatal: it means the artifact and the caller do not match.
    #[error("Schema mismatch in {context}: expected width {expected}, got {actual}")]
    Schema {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Malformed or missing field in a raw record or training column
    #[error("Invalid field `{field}`: {reason}")]
    Data { field: String, reason: String },

    /// Training could not produce a model
    #[error("Training failed: {0}")]
    Training(String),

    /// Fitted-state artifact is unreadable or failed its integrity check
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Configuration value is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ValuationError {
    pub fn schema(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::Schema {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub fn data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Data {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for the error category that indicates a mismatched fitted state
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}

impl From<bincode::Error> for ValuationError {
    fn from(err: bincode::Error) -> Self {
        Self::Artifact(err.to_string())
    }
}

/// Result type for valuation core operations
pub type Result<T> = std::result::Result<T, ValuationError>;
