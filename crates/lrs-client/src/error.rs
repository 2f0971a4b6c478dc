//! Error types for the LRS client

use thiserror::Error;

/// LRS client error
#[derive(Debug, Error)]
pub enum LrsError {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// LRS answered with a non-success status
    #[error("LRS error {status}: {message}")]
    Server { status: u16, message: String },

    /// Client configuration is unusable (bad endpoint, bad auth header)
    #[error("Invalid LRS configuration: {0}")]
    InvalidConfig(String),

    /// Launch parameters could not be parsed
    #[error("Invalid launch parameters: {0}")]
    InvalidLaunch(String),
}

/// Result type for LRS operations
pub type Result<T> = std::result::Result<T, LrsError>;
