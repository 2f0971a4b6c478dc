//! Launch parameters handed to a course by an LMS
//!
//! A launching system appends the LRS settings to the course URL:
//! `?endpoint=...&auth=...&actor={...}&registration=...&activity_id=...`.
//! Parameters other than these are kept as extended parameters.

use crate::error::{LrsError, Result};
use crate::types::{Account, Agent};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// LRS settings and learner identity extracted from a launch URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchParams {
    pub endpoint: Option<String>,
    pub auth: Option<String>,
    pub actor: Option<Agent>,
    pub registration: Option<String>,
    pub activity_id: Option<String>,
    pub extended: BTreeMap<String, String>,
}

impl LaunchParams {
    /// Parse launch parameters from the query of a course URL
    pub fn from_url(launch_url: &str) -> Result<Self> {
        let url = Url::parse(launch_url)
            .map_err(|e| LrsError::InvalidLaunch(format!("launch url '{}': {}", launch_url, e)))?;

        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "endpoint" => params.endpoint = Some(value),
                "auth" => params.auth = Some(value),
                "actor" => match parse_actor(&value) {
                    Ok(actor) => params.actor = Some(actor),
                    Err(e) => warn!(error = %e, "Ignoring unusable launch actor"),
                },
                "registration" => params.registration = Some(value),
                "activity_id" => params.activity_id = Some(value),
                other => {
                    params.extended.insert(other.to_string(), value);
                }
            }
        }

        Ok(params)
    }

    /// Whether the launch carries everything needed to talk to the LRS
    pub fn is_complete(&self) -> bool {
        self.endpoint.is_some() && self.auth.is_some() && self.actor.is_some() && self.activity_id.is_some()
    }
}

/// Parse an actor from its launch JSON.
///
/// Older launchers send `name`, `mbox` and `account` as arrays, and accounts
/// with `accountServiceHomePage`/`accountName`; these are collapsed to the
/// xAPI 1.0 shape.
pub fn parse_actor(raw: &str) -> Result<Agent> {
    let mut value: Value = serde_json::from_str(raw)
        .map_err(|e| LrsError::InvalidLaunch(format!("actor is not JSON: {}", e)))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| LrsError::InvalidLaunch("actor is not an object".into()))?;

    for key in ["name", "mbox"] {
        if let Some(Value::Array(items)) = object.get(key) {
            let first = items.first().cloned().unwrap_or(Value::Null);
            object.insert(key.to_string(), first);
        }
    }

    if let Some(Value::Array(accounts)) = object.get("account") {
        let legacy = accounts.first().cloned().unwrap_or(Value::Null);
        let field = |primary: &str, fallback: &str| {
            legacy
                .get(primary)
                .or_else(|| legacy.get(fallback))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        match (field("accountServiceHomePage", "homePage"), field("accountName", "name")) {
            (Some(home_page), Some(name)) => {
                let account = serde_json::to_value(Account { home_page, name })?;
                object.insert("account".to_string(), account);
            }
            _ => {
                object.remove("account");
            }
        }
    }

    object.entry("objectType").or_insert_with(|| Value::String("Agent".into()));
    object.retain(|_, v| !v.is_null());

    Ok(serde_json::from_value(value)?)
}
