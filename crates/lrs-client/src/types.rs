//! xAPI wire types and client configuration

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// xAPI version sent in the `X-Experience-API-Version` header
pub const XAPI_VERSION: &str = "1.0.3";

/// Language map, e.g. `{"en-US": "completed"}`
pub type LanguageMap = BTreeMap<String, String>;

/// Build a language map holding a single entry
pub fn language_map(lang: impl Into<String>, text: impl Into<String>) -> LanguageMap {
    let mut map = LanguageMap::new();
    map.insert(lang.into(), text.into());
    map
}

/// `Authorization` header value for HTTP basic authentication
pub fn basic_auth(user: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
    format!("Basic {}", token)
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct LrsConfig {
    /// Base endpoint of the xAPI API, always ending in `/`
    pub endpoint: String,
    /// Full `Authorization` header value (e.g. `Basic ...`)
    pub auth: Option<String>,
    /// xAPI version header value (default: 1.0.3)
    pub version: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Origin of the page hosting the course, if any
    pub page_origin: Option<String>,
    /// Extra launch parameters appended to statement requests
    pub extended: BTreeMap<String, String>,
}

impl Default for LrsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/xapi/".to_string(),
            auth: None,
            version: XAPI_VERSION.to_string(),
            timeout_secs: 30,
            page_origin: None,
            extended: BTreeMap::new(),
        }
    }
}

impl LrsConfig {
    /// Create a configuration for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Use HTTP basic authentication
    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        self.auth = Some(basic_auth(user, password));
        self
    }

    /// Use a prepared `Authorization` header value
    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Set the origin of the page hosting the course
    pub fn with_page_origin(mut self, origin: impl Into<String>) -> Self {
        self.page_origin = Some(origin.into());
        self
    }
}

/// Identifies whose state is being read or written
#[derive(Debug, Clone, PartialEq)]
pub struct StateQuery {
    pub activity_id: String,
    pub agent: Agent,
    pub registration: Option<String>,
}

/// Raw state document as returned by the LRS
#[derive(Debug, Clone, PartialEq)]
pub struct StateDocument {
    pub status: u16,
    pub body: String,
}

// ==================== Statement model ====================

fn agent_object_type() -> String {
    "Agent".to_string()
}

fn activity_object_type() -> String {
    "Activity".to_string()
}

/// Account-based identifier for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "homePage")]
    pub home_page: String,
    pub name: String,
}

/// The learner a statement is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(rename = "objectType", default = "agent_object_type")]
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbox: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbox_sha1sum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
}

impl Agent {
    /// Agent identified by a `mailto:` IRI
    pub fn mbox(mbox: impl Into<String>) -> Self {
        Self {
            object_type: agent_object_type(),
            name: None,
            mbox: Some(mbox.into()),
            mbox_sha1sum: None,
            openid: None,
            account: None,
        }
    }

    /// Agent identified by an account on a system
    pub fn account(home_page: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_type: agent_object_type(),
            name: None,
            mbox: None,
            mbox_sha1sum: None,
            openid: None,
            account: Some(Account {
                home_page: home_page.into(),
                name: name.into(),
            }),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the agent carries one of the inverse functional identifiers
    pub fn is_identified(&self) -> bool {
        self.mbox.is_some() || self.mbox_sha1sum.is_some() || self.openid.is_some() || self.account.is_some()
    }
}

/// Verb with its display language map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verb {
    pub id: String,
    #[serde(default)]
    pub display: LanguageMap,
}

/// Definition block of an activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<LanguageMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LanguageMap>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<String>,
    /// Interaction components (choices, source, target, ...) and extensions
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Activity used as a statement object or context activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "objectType", default = "activity_object_type")]
    pub object_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<ActivityDefinition>,
}

impl Activity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            object_type: activity_object_type(),
            id: id.into(),
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: ActivityDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Activity type IRI, if defined
    pub fn activity_type(&self) -> Option<&str> {
        self.definition.as_ref().and_then(|d| d.activity_type.as_deref())
    }
}

/// Score block of a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaled: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Result of a statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// ISO-8601 duration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl StatementResult {
    pub fn completed() -> Self {
        Self {
            completion: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Hierarchical activities a statement relates to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextActivities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent: Vec<Activity>,
}

/// Statement context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_activities: Option<ContextActivities>,
}

/// A single xAPI statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub actor: Agent,
    pub verb: Verb,
    pub object: Activity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StatementResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    /// When the experience happened; the LRS stamps statements without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Statement {
    pub fn new(actor: Agent, verb: Verb, object: Activity) -> Self {
        Self {
            id: None,
            actor,
            verb,
            object,
            result: None,
            context: None,
            timestamp: None,
        }
    }

    fn context_activities_mut(&mut self) -> &mut ContextActivities {
        self.context
            .get_or_insert_with(Context::default)
            .context_activities
            .get_or_insert_with(ContextActivities::default)
    }

    /// Add a grouping context activity (ignored if one with the same id exists)
    pub fn add_grouping_activity(&mut self, activity: Activity) {
        let activities = self.context_activities_mut();
        if !activities.grouping.iter().any(|a| a.id == activity.id) {
            activities.grouping.push(activity);
        }
    }

    /// Add a parent context activity (ignored if one with the same id exists)
    pub fn add_parent_activity(&mut self, activity: Activity) {
        let activities = self.context_activities_mut();
        if !activities.parent.iter().any(|a| a.id == activity.id) {
            activities.parent.push(activity);
        }
    }

    pub fn grouping(&self) -> &[Activity] {
        self.context
            .as_ref()
            .and_then(|c| c.context_activities.as_ref())
            .map(|c| c.grouping.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self) -> &[Activity] {
        self.context
            .as_ref()
            .and_then(|c| c.context_activities.as_ref())
            .map(|c| c.parent.as_slice())
            .unwrap_or(&[])
    }
}
