//! Mock transport for testing.

use async_trait::async_trait;
use lrs_client::{Agent, LrsError, StateDocument, StateQuery, Statement};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::traits::*;
use crate::error::Result;
use crate::state::StateKey;

/// Path a statement was delivered on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Async,
    Keepalive,
}

/// One recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Statement {
        statement: Statement,
        delivery: Delivery,
    },
    GetState(StateKey),
    PutState(StateKey, Value),
    DeleteState(StateKey),
}

/// Mock transport for testing.
///
/// Records every call in order. GET responses, DELETE statuses and
/// failures are configurable per key; unconfigured GETs answer 404.
pub struct MockTransport {
    launch: LaunchData,
    launch_error: Option<String>,
    keepalive: bool,
    fail_statements: AtomicBool,
    fail_state_puts: AtomicBool,
    documents: HashMap<StateKey, StateDocument>,
    failing_keys: Vec<StateKey>,
    delete_statuses: HashMap<StateKey, u16>,
    calls: Mutex<Vec<TransportCall>>,
}

impl MockTransport {
    /// Create a mock that launches the given learner on an activity
    pub fn new(actor: Agent, activity_id: impl Into<String>) -> Self {
        Self {
            launch: LaunchData {
                actor: Some(actor),
                activity_id: Some(activity_id.into()),
                registration: None,
            },
            launch_error: None,
            keepalive: true,
            fail_statements: AtomicBool::new(false),
            fail_state_puts: AtomicBool::new(false),
            documents: HashMap::new(),
            failing_keys: Vec::new(),
            delete_statuses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replace the launch data
    pub fn with_launch(mut self, launch: LaunchData) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_registration(mut self, registration: impl Into<String>) -> Self {
        self.launch.registration = Some(registration.into());
        self
    }

    /// Make `launch` fail
    pub fn with_launch_error(mut self, message: impl Into<String>) -> Self {
        self.launch_error = Some(message.into());
        self
    }

    /// Set keepalive support
    pub fn with_keepalive(mut self, supported: bool) -> Self {
        self.keepalive = supported;
        self
    }

    /// Answer GETs for `key` with a raw status and body
    pub fn with_state(mut self, key: StateKey, status: u16, body: impl Into<String>) -> Self {
        self.documents.insert(
            key,
            StateDocument {
                status,
                body: body.into(),
            },
        );
        self
    }

    /// Answer GETs for `key` with a JSON body
    pub fn with_state_json(self, key: StateKey, value: Value) -> Self {
        let body = value.to_string();
        self.with_state(key, 200, body)
    }

    /// Fail GETs and DELETEs for `key` at the transport level
    pub fn with_failing_key(mut self, key: StateKey) -> Self {
        self.failing_keys.push(key);
        self
    }

    /// Answer DELETEs for `key` with a status (default 204)
    pub fn with_delete_status(mut self, key: StateKey, status: u16) -> Self {
        self.delete_statuses.insert(key, status);
        self
    }

    /// Make statement sends fail
    pub fn set_fail_statements(&self, fail: bool) {
        self.fail_statements.store(fail, Ordering::SeqCst);
    }

    /// Make state PUTs fail
    pub fn set_fail_state_puts(&self, fail: bool) {
        self.fail_state_puts.store(fail, Ordering::SeqCst);
    }

    /// Every call so far, oldest first
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    /// Statements delivered so far with their delivery path
    pub async fn deliveries(&self) -> Vec<(Statement, Delivery)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::Statement { statement, delivery } => Some((statement.clone(), *delivery)),
                _ => None,
            })
            .collect()
    }

    /// Statements delivered so far
    pub async fn statements(&self) -> Vec<Statement> {
        self.deliveries().await.into_iter().map(|(s, _)| s).collect()
    }

    /// Verb ids of delivered statements, in order
    pub async fn verbs(&self) -> Vec<String> {
        self.statements().await.into_iter().map(|s| s.verb.id).collect()
    }

    /// State documents written so far
    pub async fn state_puts(&self) -> Vec<(StateKey, Value)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::PutState(key, body) => Some((*key, body.clone())),
                _ => None,
            })
            .collect()
    }

    /// Keys deleted so far
    pub async fn state_deletes(&self) -> Vec<StateKey> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::DeleteState(key) => Some(*key),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls
    pub async fn reset(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }

    async fn record_statements(&self, statements: &[Statement], delivery: Delivery) -> Result<()> {
        if self.fail_statements.load(Ordering::SeqCst) {
            return Err(unavailable("statements rejected by mock"));
        }

        let mut calls = self.calls.lock().await;
        for statement in statements {
            calls.push(TransportCall::Statement {
                statement: statement.clone(),
                delivery,
            });
        }
        Ok(())
    }
}

fn unavailable(message: &str) -> crate::error::TrackerError {
    LrsError::Server {
        status: 503,
        message: message.to_string(),
    }
    .into()
}

#[async_trait]
impl Transport for MockTransport {
    async fn launch(&self) -> Result<LaunchData> {
        match self.launch_error {
            Some(ref message) => Err(LrsError::InvalidLaunch(message.clone()).into()),
            None => Ok(self.launch.clone()),
        }
    }

    async fn send_statement(&self, statement: &Statement) -> Result<()> {
        self.record_statements(std::slice::from_ref(statement), Delivery::Async).await
    }

    async fn send_statements_keepalive(&self, statements: &[Statement]) -> Result<()> {
        self.record_statements(statements, Delivery::Keepalive).await
    }

    fn supports_keepalive(&self) -> bool {
        self.keepalive
    }

    async fn get_state(&self, _query: &StateQuery, key: StateKey) -> Result<StateDocument> {
        self.record(TransportCall::GetState(key)).await;

        if self.failing_keys.contains(&key) {
            return Err(unavailable("state unavailable"));
        }

        Ok(self.documents.get(&key).cloned().unwrap_or(StateDocument {
            status: 404,
            body: String::new(),
        }))
    }

    async fn send_state(&self, _query: &StateQuery, key: StateKey, body: &Value) -> Result<()> {
        if self.fail_state_puts.load(Ordering::SeqCst) {
            return Err(unavailable("state rejected by mock"));
        }
        self.record(TransportCall::PutState(key, body.clone())).await;
        Ok(())
    }

    async fn delete_state(&self, _query: &StateQuery, key: StateKey) -> Result<u16> {
        self.record(TransportCall::DeleteState(key)).await;

        if self.failing_keys.contains(&key) {
            return Err(unavailable("state unavailable"));
        }
        Ok(self.delete_statuses.get(&key).copied().unwrap_or(204))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lrs_client::{language_map, Activity, Verb};
    use serde_json::json;

    fn query() -> StateQuery {
        StateQuery {
            activity_id: "https://x/course".into(),
            agent: Agent::mbox("mailto:a@example.com"),
            registration: None,
        }
    }

    fn statement() -> Statement {
        Statement::new(
            Agent::mbox("mailto:a@example.com"),
            Verb {
                id: "http://adlnet.gov/expapi/verbs/launched".into(),
                display: language_map("en-US", "launched"),
            },
            Activity::new("https://x/course"),
        )
    }

    #[tokio::test]
    async fn test_records_statements_with_delivery() {
        let mock = MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course");

        mock.send_statement(&statement()).await.unwrap();
        mock.send_statements_keepalive(&[statement(), statement()]).await.unwrap();

        let deliveries: Vec<_> = mock.deliveries().await.into_iter().map(|(_, d)| d).collect();
        assert_eq!(deliveries, vec![Delivery::Async, Delivery::Keepalive, Delivery::Keepalive]);
    }

    #[tokio::test]
    async fn test_state_defaults_and_overrides() {
        let mock = MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course")
            .with_state_json(StateKey::Course, json!({"_isComplete": false}))
            .with_failing_key(StateKey::Blocks)
            .with_delete_status(StateKey::Articles, 500);

        assert_eq!(mock.get_state(&query(), StateKey::Components).await.unwrap().status, 404);
        assert_eq!(mock.get_state(&query(), StateKey::Course).await.unwrap().status, 200);
        assert!(mock.get_state(&query(), StateKey::Blocks).await.is_err());
        assert_eq!(mock.delete_state(&query(), StateKey::Articles).await.unwrap(), 500);
        assert_eq!(mock.delete_state(&query(), StateKey::Course).await.unwrap(), 204);
        assert_eq!(mock.state_deletes().await, vec![StateKey::Articles, StateKey::Course]);
    }

    #[tokio::test]
    async fn test_failures() {
        let mock = MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course")
            .with_launch_error("no actor");
        assert!(mock.launch().await.is_err());

        mock.set_fail_statements(true);
        assert!(mock.send_statement(&statement()).await.is_err());
        assert!(mock.statements().await.is_empty());
    }
}
