//! Tracker configuration
//!
//! Loaded once from TOML and shared by `Arc` with every component.

use crate::error::{Result, TrackerError};
use lrs_client::{basic_auth, Agent, LaunchParams, LrsConfig, XAPI_VERSION};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::warn;
use url::Url;

/// Language used when the configured one has no translation
pub const DEFAULT_LANG: &str = "en-US";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Master switch; a disabled tracker never bootstraps
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Course activity IRI
    #[serde(default)]
    pub activity_id: Option<String>,

    /// URL the course is served from, used when no activity id is known
    #[serde(default)]
    pub base_url: Option<String>,

    /// Language of verb displays in statements
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Give every statement a client-side UUID
    #[serde(default)]
    pub generate_ids: bool,

    /// Persist and restore progress through the state API
    #[serde(default = "default_true")]
    pub track_state: bool,

    /// Scope state and statements by the launch registration
    #[serde(default = "default_true")]
    pub use_registration: bool,

    /// Component names that never produce statements
    #[serde(default, deserialize_with = "deserialize_blacklist")]
    pub component_blacklist: Vec<String>,

    #[serde(default)]
    pub lrs_failure_behaviour: FailureBehaviour,

    /// Send suspend statements when the page is hidden
    #[serde(default = "default_true")]
    pub commit_on_visibility_change_hidden: bool,

    #[serde(default)]
    pub core_events: CoreEvents,

    #[serde(default)]
    pub lrs: LrsSettings,
}

/// Whether the learner is told when the LRS is unreachable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureBehaviour {
    #[default]
    Show,
    Ignore,
}

/// Which domain events produce statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreEvents {
    pub router_page: bool,
    pub router_menu: bool,
    pub assessment_complete: bool,
    pub question_interaction: bool,
    pub custom_statement: bool,
    pub content_objects_complete: bool,
    pub articles_complete: bool,
    pub blocks_complete: bool,
    pub components_complete: bool,
}

impl Default for CoreEvents {
    fn default() -> Self {
        Self {
            router_page: false,
            router_menu: false,
            assessment_complete: true,
            question_interaction: true,
            custom_statement: true,
            content_objects_complete: false,
            articles_complete: false,
            blocks_complete: false,
            components_complete: true,
        }
    }
}

/// Connection settings for the LRS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LrsSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Prepared `Authorization` header, wins over user/password
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Origin of the page hosting the course
    #[serde(default)]
    pub page_origin: Option<String>,
    /// Course URL carrying launch parameters
    #[serde(default)]
    pub launch_url: Option<String>,
    #[serde(default)]
    pub actor: Option<Agent>,
    #[serde(default)]
    pub registration: Option<String>,
}

impl Default for LrsSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            user: None,
            password: None,
            auth: None,
            version: default_version(),
            timeout_secs: default_timeout(),
            page_origin: None,
            launch_url: None,
            actor: None,
            registration: None,
        }
    }
}

// Defaults
fn default_true() -> bool { true }
fn default_lang() -> String { DEFAULT_LANG.to_string() }
fn default_version() -> String { XAPI_VERSION.to_string() }
fn default_timeout() -> u64 { 30 }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activity_id: None,
            base_url: None,
            lang: default_lang(),
            generate_ids: false,
            track_state: true,
            use_registration: true,
            component_blacklist: Vec::new(),
            lrs_failure_behaviour: FailureBehaviour::default(),
            commit_on_visibility_change_hidden: true,
            core_events: CoreEvents::default(),
            lrs: LrsSettings::default(),
        }
    }
}

/// Blacklists arrive either as `"a, b"` or `["a", "b"]`
fn deserialize_blacklist<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Blacklist {
        Text(String),
        List(Vec<String>),
    }

    let items = match Blacklist::deserialize(deserializer)? {
        Blacklist::Text(text) => text.split(',').map(str::to_string).collect(),
        Blacklist::List(items) => items,
    };

    Ok(items
        .into_iter()
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect())
}

/// LRS client settings together with the identity the launch supplied
#[derive(Debug, Clone)]
pub struct ResolvedLrs {
    pub client: LrsConfig,
    pub launch: LaunchParams,
}

impl TrackerConfig {
    /// Parse configuration from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Whether a component name is excluded from tracking
    pub fn is_component_blacklisted(&self, component: &str) -> bool {
        let component = component.to_lowercase();
        self.component_blacklist.iter().any(|c| *c == component)
    }

    /// Work out how to reach the LRS.
    ///
    /// A configured endpoint wins; otherwise the launch URL must carry the
    /// endpoint, auth, actor and activity id.
    pub fn resolve_lrs(&self) -> Result<ResolvedLrs> {
        let settings = &self.lrs;
        let mut launch = match settings.launch_url {
            Some(ref url) => LaunchParams::from_url(url)?,
            None => LaunchParams::default(),
        };

        let (endpoint, auth) = match settings.endpoint {
            Some(ref endpoint) => {
                let auth = match (&settings.auth, &settings.user) {
                    (Some(auth), _) => Some(auth.clone()),
                    (None, Some(user)) => Some(basic_auth(user, settings.password.as_deref().unwrap_or_default())),
                    (None, None) => launch.auth.clone(),
                };
                (normalize_endpoint(endpoint)?, auth)
            }
            None if launch.is_complete() => {
                let endpoint = launch.endpoint.clone().unwrap_or_default();
                (normalize_endpoint(&endpoint)?, launch.auth.clone())
            }
            None => {
                return Err(TrackerError::Config(
                    "no LRS endpoint configured and launch parameters are incomplete".into(),
                ))
            }
        };

        if launch.actor.is_none() {
            launch.actor = settings.actor.clone();
        }
        if launch.registration.is_none() {
            launch.registration = settings.registration.clone();
        }

        let mut client = LrsConfig::new(endpoint);
        client.auth = auth;
        client.version = settings.version.clone();
        client.timeout_secs = settings.timeout_secs;
        client.page_origin = settings.page_origin.clone();
        client.extended = launch.extended.clone();

        Ok(ResolvedLrs { client, launch })
    }
}

/// Enforce a trailing slash and a scheme on an endpoint
pub fn normalize_endpoint(raw: &str) -> Result<String> {
    let mut endpoint = raw.trim().to_string();
    if endpoint.is_empty() {
        return Err(TrackerError::Config("LRS endpoint is empty".into()));
    }

    let lower = endpoint.to_lowercase();
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        warn!(endpoint = %endpoint, "LRS endpoint is missing protocol, defaulting to http://");
        endpoint = format!("http://{}", endpoint);
    }
    if !endpoint.ends_with('/') {
        endpoint.push('/');
    }

    Url::parse(&endpoint).map_err(|e| TrackerError::Config(format!("LRS endpoint '{}': {}", endpoint, e)))?;
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::from_toml_str("").unwrap();
        assert!(config.enabled);
        assert!(config.track_state);
        assert!(config.use_registration);
        assert_eq!(config.lang, "en-US");
        assert_eq!(config.core_events, CoreEvents::default());
        assert!(config.core_events.components_complete);
        assert!(!config.core_events.router_page);
        assert_eq!(config.lrs.version, "1.0.3");
        assert_eq!(config.lrs_failure_behaviour, FailureBehaviour::Show);
    }

    #[test]
    fn test_blacklist_from_comma_string() {
        let config = TrackerConfig::from_toml_str(r#"component_blacklist = "HotGraphic, narrative,""#).unwrap();
        assert_eq!(config.component_blacklist, vec!["hotgraphic", "narrative"]);
        assert!(config.is_component_blacklisted("hotgraphic"));
        assert!(config.is_component_blacklisted("Narrative"));
        assert!(!config.is_component_blacklisted("mcq"));
    }

    #[test]
    fn test_blacklist_from_array() {
        let config = TrackerConfig::from_toml_str(r#"component_blacklist = ["Media", " text "]"#).unwrap();
        assert_eq!(config.component_blacklist, vec!["media", "text"]);
    }

    #[test]
    fn test_core_event_overrides_keep_other_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
[core_events]
router_page = true
components_complete = false
"#,
        )
        .unwrap();
        assert!(config.core_events.router_page);
        assert!(!config.core_events.components_complete);
        assert!(config.core_events.question_interaction);
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("https://lrs.example.com/xapi").unwrap(), "https://lrs.example.com/xapi/");
        assert_eq!(normalize_endpoint("lrs.example.com/xapi/").unwrap(), "http://lrs.example.com/xapi/");
        assert!(matches!(normalize_endpoint("  "), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_resolve_static_endpoint_with_basic_auth() {
        let config = TrackerConfig::from_toml_str(
            r#"
[lrs]
endpoint = "https://lrs.example.com/xapi"
user = "key"
password = "secret"
registration = "reg-1"

[lrs.actor]
mbox = "mailto:learner@example.com"
"#,
        )
        .unwrap();

        let resolved = config.resolve_lrs().unwrap();
        assert_eq!(resolved.client.endpoint, "https://lrs.example.com/xapi/");
        assert_eq!(resolved.client.auth.as_deref(), Some("Basic a2V5OnNlY3JldA=="));
        assert_eq!(resolved.launch.actor, Some(Agent::mbox("mailto:learner@example.com")));
        assert_eq!(resolved.launch.registration.as_deref(), Some("reg-1"));
    }

    #[test]
    fn test_resolve_requires_endpoint_or_complete_launch() {
        let config = TrackerConfig::default();
        assert!(matches!(config.resolve_lrs(), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_resolve_from_launch_url() {
        let mut config = TrackerConfig::default();
        config.lrs.launch_url = Some(
            "https://course.example.com/?endpoint=https%3A%2F%2Flrs.example.com%2Fxapi&auth=Basic%20abc\
             &actor=%7B%22mbox%22%3A%22mailto%3Aa%40example.com%22%7D&activity_id=https%3A%2F%2Fx%2Fcourse"
                .into(),
        );

        let resolved = config.resolve_lrs().unwrap();
        assert_eq!(resolved.client.endpoint, "https://lrs.example.com/xapi/");
        assert_eq!(resolved.client.auth.as_deref(), Some("Basic abc"));
        assert_eq!(resolved.launch.activity_id.as_deref(), Some("https://x/course"));
    }
}
