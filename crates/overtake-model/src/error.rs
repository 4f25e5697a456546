//! Model Error Types

use thiserror::Error;

/// Errors raised while parsing or encoding model values
#[derive(Debug, Error)]
pub enum ModelError {
    /// Direction string not recognised
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    /// Configuration values contradict each other
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Command could not be encoded
    #[error("Command encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Encoding(err.to_string())
    }
}
