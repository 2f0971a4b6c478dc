//! Write-through state cache backed by the LRS state API

use futures::future::join_all;
use lrs_client::{LrsError, StateDocument, StateQuery};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::{State, StateKey, ID_FIELD};
use crate::content::ContentNode;
use crate::error::{KeyFailure, Result, TrackerError};
use crate::signals::{Signals, TrackerSignal};
use crate::transport::Transport;

/// Owns the in-memory [`State`] for one learner and activity.
///
/// The cache is updated before any network write and never rolled back;
/// a failed flush leaves it ahead of the LRS until the next flush succeeds.
pub struct StateStore {
    transport: Arc<dyn Transport>,
    query: StateQuery,
    cache: RwLock<State>,
    signals: Signals,
}

impl StateStore {
    pub fn new(transport: Arc<dyn Transport>, query: StateQuery, signals: Signals) -> Self {
        Self {
            transport,
            query,
            cache: RwLock::new(State::new()),
            signals,
        }
    }

    pub fn query(&self) -> &StateQuery {
        &self.query
    }

    /// Copy of the current cache
    pub async fn snapshot(&self) -> State {
        self.cache.read().await.clone()
    }

    /// Fetch all six keys.
    ///
    /// Every key is attempted. If any key fails the cache is left untouched
    /// and an aggregate error names the failed keys; otherwise each fetched
    /// key replaces its cached value.
    pub async fn load(&self) -> Result<State> {
        let responses = join_all(
            StateKey::ALL
                .iter()
                .map(|key| self.transport.get_state(&self.query, *key)),
        )
        .await;

        let mut fetched = Vec::new();
        let mut failures = Vec::new();

        for (key, response) in StateKey::ALL.into_iter().zip(responses) {
            match classify(key, response) {
                Ok(Some(value)) => fetched.push((key, value)),
                Ok(None) => debug!(key = %key, "No saved state"),
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to load state");
                    failures.push(KeyFailure {
                        key,
                        message: e.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            error!(failed = failures.len(), "State load failed, keeping current state");
            return Err(TrackerError::Aggregate {
                operation: "load",
                failures,
            });
        }

        let state = {
            let mut cache = self.cache.write().await;
            for (key, value) in fetched {
                cache.replace(key, value);
            }
            cache.clone()
        };

        self.signals.emit(TrackerSignal::StateLoaded);
        Ok(state)
    }

    /// Update a collection in the cache, returning its new value.
    ///
    /// List collections take one entry carrying an `_id`; scalar
    /// collections are replaced wholesale.
    pub async fn apply(&self, key: StateKey, value: Value) -> Result<Value> {
        if !key.is_list() {
            let mut cache = self.cache.write().await;
            cache.replace(key, value.clone());
            return Ok(value);
        }

        let id = value
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TrackerError::Config(format!("{} entry without {}", key, ID_FIELD)))?;

        let mut cache = self.cache.write().await;
        Ok(cache.upsert(key, &id, value).clone())
    }

    /// Update the cache entry for a content node
    pub async fn apply_node(&self, node: &ContentNode, value: Value) -> Result<StateKey> {
        let key = StateKey::for_kind(&node.kind).ok_or_else(|| {
            TrackerError::Config(format!("no state collection for {} '{}'", node.kind, node.id))
        })?;

        let mut cache = self.cache.write().await;
        if key.is_list() {
            cache.upsert(key, &node.id, value);
        } else {
            cache.replace(key, value);
        }
        Ok(key)
    }

    /// Send the cached value of one key to the LRS
    pub async fn flush(&self, key: StateKey) -> Result<()> {
        let body = self.cache.read().await.get(key).cloned();
        let Some(body) = body else {
            debug!(key = %key, "Nothing to flush");
            return Ok(());
        };

        match self.transport.send_state(&self.query, key, &body).await {
            Ok(()) => {
                debug!(key = %key, "State sent");
                self.signals.emit(TrackerSignal::StateSent { key });
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to send state");
                self.signals.emit(TrackerSignal::StateFailed {
                    key,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Update a node's entry and send its collection
    pub async fn record(&self, node: &ContentNode, value: Value) -> Result<()> {
        let key = self.apply_node(node, value).await?;
        self.flush(key).await
    }

    /// Delete all six keys at the LRS, then reset the cache.
    ///
    /// Failed deletes do not stop the remaining ones.
    pub async fn clear(&self) -> Result<()> {
        let responses = join_all(
            StateKey::ALL
                .iter()
                .map(|key| self.transport.delete_state(&self.query, *key)),
        )
        .await;

        let failures: Vec<KeyFailure> = StateKey::ALL
            .into_iter()
            .zip(responses)
            .filter_map(|(key, response)| match response {
                Ok(200) | Ok(204) => None,
                Ok(status) => Some(KeyFailure {
                    key,
                    message: format!("unexpected status {}", status),
                }),
                Err(e) => Some(KeyFailure {
                    key,
                    message: e.to_string(),
                }),
            })
            .collect();

        *self.cache.write().await = State::new();

        if !failures.is_empty() {
            for failure in &failures {
                warn!(key = %failure.key, error = %failure.message, "Failed to delete state");
            }
            error!(failed = failures.len(), "State clear incomplete");
            return Err(TrackerError::Aggregate {
                operation: "clear",
                failures,
            });
        }

        self.signals.emit(TrackerSignal::StateCleared);
        Ok(())
    }
}

/// Interpret a GET response; `Ok(None)` means no saved state
fn classify(key: StateKey, response: Result<StateDocument>) -> Result<Option<Value>> {
    let document = response?;

    match document.status {
        404 | 204 => return Ok(None),
        200..=299 => {}
        status => {
            return Err(TrackerError::Transport(LrsError::Server {
                status,
                message: document.body,
            }))
        }
    }

    if document.body.trim().is_empty() {
        return Ok(None);
    }

    let parse_error = |message: String| TrackerError::Parse { key, message };
    let value: Value = serde_json::from_str(&document.body).map_err(|e| parse_error(e.to_string()))?;

    let empty = match value {
        Value::Null => true,
        Value::Object(ref map) => map.is_empty(),
        Value::Array(ref items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(None);
    }

    match (key.is_list(), &value) {
        (true, Value::Array(_)) | (false, Value::Object(_)) => Ok(Some(value)),
        (true, _) => Err(parse_error("expected a list".to_string())),
        (false, _) => Err(parse_error("expected an object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use lrs_client::Agent;
    use serde_json::json;

    fn learner() -> Agent {
        Agent::mbox("mailto:a@example.com")
    }

    fn store(mock: MockTransport) -> (StateStore, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let query = StateQuery {
            activity_id: "https://x/course".into(),
            agent: learner(),
            registration: None,
        };
        (StateStore::new(mock.clone(), query, Signals::new()), mock)
    }

    #[test]
    fn test_classify() {
        let doc = |status: u16, body: &str| {
            Ok(StateDocument {
                status,
                body: body.to_string(),
            })
        };

        assert_eq!(classify(StateKey::Course, doc(404, "")).unwrap(), None);
        assert_eq!(classify(StateKey::Course, doc(200, "")).unwrap(), None);
        assert_eq!(classify(StateKey::Course, doc(200, "{}")).unwrap(), None);
        assert_eq!(classify(StateKey::Blocks, doc(200, "[]")).unwrap(), None);
        assert_eq!(classify(StateKey::Blocks, doc(200, "null")).unwrap(), None);
        assert_eq!(
            classify(StateKey::Course, doc(200, r#"{"_isComplete":true}"#)).unwrap(),
            Some(json!({"_isComplete": true}))
        );
        assert!(matches!(
            classify(StateKey::Course, doc(500, "")),
            Err(TrackerError::Transport(LrsError::Server { status: 500, .. }))
        ));
        assert!(matches!(
            classify(StateKey::Course, doc(200, "{not json")),
            Err(TrackerError::Parse { key: StateKey::Course, .. })
        ));
        assert!(matches!(
            classify(StateKey::Blocks, doc(200, r#"{"_id":"b"}"#)),
            Err(TrackerError::Parse { key: StateKey::Blocks, .. })
        ));
    }

    #[tokio::test]
    async fn test_load_adopts_fetched_keys() {
        let (store, _) = store(
            MockTransport::new(learner(), "https://x/course")
                .with_state_json(StateKey::Course, json!({"_isComplete": false}))
                .with_state_json(StateKey::Components, json!([{"_id": "c-1"}])),
        );

        let state = store.load().await.unwrap();
        assert_eq!(state.get(StateKey::Course), Some(&json!({"_isComplete": false})));
        assert_eq!(state.list(StateKey::Components).len(), 1);
        assert!(state.get(StateKey::Blocks).is_none());
    }

    #[tokio::test]
    async fn test_apply_requires_id_for_lists() {
        let (store, _) = store(MockTransport::new(learner(), "https://x/course"));

        assert!(store.apply(StateKey::Blocks, json!({"_isComplete": true})).await.is_err());

        let blocks = store
            .apply(StateKey::Blocks, json!({"_id": "b-1", "_isComplete": true}))
            .await
            .unwrap();
        assert_eq!(blocks, json!([{"_id": "b-1", "_isComplete": true}]));

        let course = store.apply(StateKey::Course, json!({"_score": 3})).await.unwrap();
        assert_eq!(course, json!({"_score": 3}));
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_cache() {
        let (store, mock) = store(MockTransport::new(learner(), "https://x/course"));
        let node = ContentNode::new("c-1", "component");

        mock.set_fail_state_puts(true);
        assert!(store.record(&node, json!({"_isComplete": true})).await.is_err());
        assert!(store.snapshot().await.entry(StateKey::Components, "c-1").is_some());

        mock.set_fail_state_puts(false);
        store.flush(StateKey::Components).await.unwrap();
        assert_eq!(
            mock.state_puts().await,
            vec![(StateKey::Components, json!([{"_id": "c-1", "_isComplete": true}]))]
        );
    }

    #[tokio::test]
    async fn test_node_without_collection_is_rejected() {
        let (store, _) = store(MockTransport::new(learner(), "https://x/course"));
        let node = ContentNode::new("quiz", "article-assessment");
        assert!(matches!(store.apply_node(&node, json!({})).await, Err(TrackerError::Config(_))));
    }
}
