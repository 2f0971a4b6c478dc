//! Error types for the tracker

use crate::state::StateKey;
use lrs_client::LrsError;
use thiserror::Error;

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// One failed key of a fan-out state operation
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFailure {
    pub key: StateKey,
    pub message: String,
}

/// Tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Actor or activity id could not be established; the session is inert
    #[error("Identity unavailable: {0}")]
    Identity(String),

    /// A single statement or state call failed
    #[error("Transport error: {0}")]
    Transport(#[from] LrsError),

    /// A state body could not be parsed
    #[error("Malformed state for '{key}': {message}")]
    Parse { key: StateKey, message: String },

    /// Invalid configuration; aborts only the triggering operation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Verb key not present in the catalog
    #[error("Unknown verb: {0}")]
    UnknownVerb(String),

    /// No activity could be derived for a content node
    #[error("Cannot derive an activity for node '{0}'")]
    UnresolvableActivity(String),

    /// Some keys of a fan-out state operation failed
    #[error("{operation} failed for {} state key(s)", .failures.len())]
    Aggregate {
        operation: &'static str,
        failures: Vec<KeyFailure>,
    },

    /// The session is not in a phase that allows tracking
    #[error("Tracking inactive: {0}")]
    Inactive(String),
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Transport(LrsError::Json(err))
    }
}
