//! HTTP transport backed by `lrs-client`.

use async_trait::async_trait;
use lrs_client::{LaunchParams, LrsClient, StateDocument, StateQuery, Statement};
use serde_json::Value;
use tracing::debug;

use super::traits::*;
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::state::StateKey;

/// Transport talking to a real LRS.
pub struct HttpTransport {
    client: LrsClient,
    launch: LaunchParams,
}

impl HttpTransport {
    /// Create a transport from a client and the launch it was configured from
    pub fn new(client: LrsClient, launch: LaunchParams) -> Self {
        Self { client, launch }
    }

    /// Create a transport from tracker configuration
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let resolved = config.resolve_lrs()?;
        debug!(endpoint = %resolved.client.endpoint, "Configured LRS transport");
        Ok(Self::new(LrsClient::new(resolved.client)?, resolved.launch))
    }

    pub fn client(&self) -> &LrsClient {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn launch(&self) -> Result<LaunchData> {
        Ok(LaunchData {
            actor: self.launch.actor.clone(),
            activity_id: self.launch.activity_id.clone(),
            registration: self.launch.registration.clone(),
        })
    }

    async fn send_statement(&self, statement: &Statement) -> Result<()> {
        Ok(self.client.send_statement(statement).await?)
    }

    async fn send_statements_keepalive(&self, statements: &[Statement]) -> Result<()> {
        Ok(self.client.send_statements(statements).await?)
    }

    fn supports_keepalive(&self) -> bool {
        self.client.supports_keepalive()
    }

    async fn get_state(&self, query: &StateQuery, key: StateKey) -> Result<StateDocument> {
        Ok(self.client.get_state(query, key.as_str()).await?)
    }

    async fn send_state(&self, query: &StateQuery, key: StateKey, body: &Value) -> Result<()> {
        Ok(self.client.put_state(query, key.as_str(), body).await?)
    }

    async fn delete_state(&self, query: &StateQuery, key: StateKey) -> Result<u16> {
        Ok(self.client.delete_state(query, key.as_str()).await?)
    }
}
