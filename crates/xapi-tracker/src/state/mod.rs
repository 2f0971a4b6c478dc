//! Learner progress state
//!
//! State is partitioned into six collection keys. `course` and
//! `offlineStorage` hold one object each; the other keys hold a list of
//! per-node objects, unique by `_id`.

mod store;

pub use store::StateStore;

use crate::content::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Member naming the node a list entry belongs to
pub const ID_FIELD: &str = "_id";

/// Collection-type key of a state document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateKey {
    Course,
    ContentObjects,
    Articles,
    Blocks,
    Components,
    OfflineStorage,
}

impl StateKey {
    pub const ALL: [StateKey; 6] = [
        StateKey::Course,
        StateKey::ContentObjects,
        StateKey::Articles,
        StateKey::Blocks,
        StateKey::Components,
        StateKey::OfflineStorage,
    ];

    /// State id used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Course => "course",
            StateKey::ContentObjects => "contentObjects",
            StateKey::Articles => "articles",
            StateKey::Blocks => "blocks",
            StateKey::Components => "components",
            StateKey::OfflineStorage => "offlineStorage",
        }
    }

    /// Whether the key holds a list of per-node objects
    pub fn is_list(&self) -> bool {
        !matches!(self, StateKey::Course | StateKey::OfflineStorage)
    }

    /// Collection a content node's state belongs to
    pub fn for_kind(kind: &NodeKind) -> Option<StateKey> {
        match kind {
            NodeKind::Course => Some(StateKey::Course),
            NodeKind::Menu | NodeKind::Page => Some(StateKey::ContentObjects),
            NodeKind::Article => Some(StateKey::Articles),
            NodeKind::Block => Some(StateKey::Blocks),
            NodeKind::Component => Some(StateKey::Components),
            _ => None,
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory copy of all collections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    entries: BTreeMap<StateKey, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: StateKey) -> Option<&Value> {
        self.entries.get(&key)
    }

    /// Entries of a list collection
    pub fn list(&self, key: StateKey) -> &[Value] {
        match self.entries.get(&key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Entry with the given `_id` in a list collection
    pub fn entry(&self, key: StateKey, id: &str) -> Option<&Value> {
        self.list(key)
            .iter()
            .find(|item| item.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.entries.keys().copied()
    }

    /// Replace a whole collection
    pub fn replace(&mut self, key: StateKey, value: Value) {
        self.entries.insert(key, value);
    }

    /// Replace the entry with `id` in place, or append it
    pub fn upsert(&mut self, key: StateKey, id: &str, mut value: Value) -> &Value {
        if let Value::Object(ref mut object) = value {
            object
                .entry(ID_FIELD)
                .or_insert_with(|| Value::String(id.to_string()));
        }

        let collection = self
            .entries
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !collection.is_array() {
            *collection = Value::Array(Vec::new());
        }

        if let Value::Array(items) = &mut *collection {
            match items
                .iter()
                .position(|item| item.get(ID_FIELD).and_then(Value::as_str) == Some(id))
            {
                Some(index) => items[index] = value,
                None => items.push(value),
            }
        }

        collection
    }
}
