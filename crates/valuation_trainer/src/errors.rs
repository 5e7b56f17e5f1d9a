use thiserror::Error;

/// Errors returned by the offline trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("invalid field `{field}`: {reason}")]
    Data { field: String, reason: String },

    #[error("training error: {0}")]
    Training(String),
}

impl TrainerError {
    /// Keep malformed-field errors as [`TrainerError::Data`]; anything else
    /// becomes the variant built by `fallback` from the full error chain.
    pub(crate) fn classify(err: anyhow::Error, fallback: fn(String) -> Self) -> Self {
        match err.downcast_ref::<carvault_core::ValuationError>() {
            Some(carvault_core::ValuationError::Data { field, reason }) => Self::Data {
                field: field.clone(),
                reason: reason.clone(),
            },
            _ => fallback(format!("{err:#}")),
        }
    }
}
