//! Error types shared across the labeling core.

use thiserror::Error;

/// Errors raised by the shared type layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Color string could not be parsed
    #[error("Invalid color '{0}'")]
    InvalidColor(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
