//! Core trait for LRS transports.

use async_trait::async_trait;
use lrs_client::{Agent, StateDocument, StateQuery, Statement};
use serde_json::Value;

use crate::error::Result;
use crate::state::StateKey;

/// Identity discovered when the session is bootstrapped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchData {
    pub actor: Option<Agent>,
    pub activity_id: Option<String>,
    pub registration: Option<String>,
}

/// Wire operations the tracker needs from an LRS.
///
/// Timeouts belong to the implementation; the tracker never retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Discover the learner and launch context
    async fn launch(&self) -> Result<LaunchData>;

    /// POST one statement
    async fn send_statement(&self, statement: &Statement) -> Result<()>;

    /// POST a batch in a single request that is awaited to completion
    async fn send_statements_keepalive(&self, statements: &[Statement]) -> Result<()>;

    /// Whether `send_statements_keepalive` can be used
    fn supports_keepalive(&self) -> bool;

    /// GET a state document; any status is returned to the caller
    async fn get_state(&self, query: &StateQuery, key: StateKey) -> Result<StateDocument>;

    /// PUT a state document
    async fn send_state(&self, query: &StateQuery, key: StateKey, body: &Value) -> Result<()>;

    /// DELETE a state document, returning the HTTP status
    async fn delete_state(&self, query: &StateQuery, key: StateKey) -> Result<u16>;
}
