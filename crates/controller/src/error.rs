//! Controller Error Types

use overtake_model::ModelError;
use thiserror::Error;

/// Failures delivering a command to the actuation endpoint
#[derive(Debug, Error)]
pub enum SinkError {
    /// Endpoint address could not be parsed
    #[error("Invalid command endpoint: {0}")]
    InvalidEndpoint(String),

    /// Socket error, including a full send buffer
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Command could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] ModelError),

    /// Receiving side is not keeping up
    #[error("Command channel full")]
    ChannelFull,

    /// Receiving side went away
    #[error("Command channel closed")]
    ChannelClosed,
}

/// Failures loading or persisting configuration
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ModelError),

    #[error("Failed to write configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode configuration: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors surfaced by the controller API
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Command not delivered: {0}")]
    Sink(#[from] SinkError),

    /// Operator command refused while a manoeuvre is running
    #[error("Lane change already in progress")]
    Busy,

    /// No lane to move into
    #[error("No lane available to the {0}")]
    NoLane(String),

    #[error("Snapshot source error: {0}")]
    Source(String),
}

impl From<std::io::Error> for ControllerError {
    fn from(err: std::io::Error) -> Self {
        ControllerError::Source(err.to_string())
    }
}
