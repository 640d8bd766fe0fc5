//! Error types for the Kolosal NAS search spaces

use thiserror::Error;

/// Result type alias for Kolosal NAS operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Main error type for the search-space crate
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Token out of range at position {position}: {value} not in [0, {bound})")]
    TokenOutOfRange {
        position: usize,
        value: usize,
        bound: usize,
    },

    #[error("Graph construction error: {0}")]
    GraphError(String),
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl KolosalError {
    /// Shorthand for an [`KolosalError::InvalidParameter`]
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        KolosalError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
