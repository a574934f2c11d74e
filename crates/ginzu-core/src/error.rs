use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Inconsistent override: {switch} is enabled but {payload} was not provided")]
    InconsistentOverride {
        switch: &'static str,
        payload: &'static str,
    },

    #[error("Invalid stable state: {0}")]
    InvalidStableState(String),

    #[error("Numeric overflow in {context}")]
    NumericOverflow { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
