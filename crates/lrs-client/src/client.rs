//! HTTP client for the xAPI statement and state resources

use crate::error::{LrsError, Result};
use crate::types::*;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for a Learning Record Store
///
/// # Example
///
/// ```rust,no_run
/// use lrs_client::{LrsClient, LrsConfig};
///
/// # async fn example(statement: lrs_client::Statement) -> Result<(), Box<dyn std::error::Error>> {
/// let client = LrsClient::new(LrsConfig::new("https://lrs.example.com/xapi/"))?;
/// client.send_statement(&statement).await?;
/// # Ok(())
/// # }
/// ```
pub struct LrsClient {
    config: LrsConfig,
    client: Client,
}

impl LrsClient {
    /// Create a new LRS client
    pub fn new(config: LrsConfig) -> Result<Self> {
        Url::parse(&config.endpoint)
            .map_err(|e| LrsError::InvalidConfig(format!("endpoint '{}': {}", config.endpoint, e)))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "X-Experience-API-Version",
            header::HeaderValue::from_str(&config.version)
                .map_err(|e| LrsError::InvalidConfig(format!("version header: {}", e)))?,
        );
        if let Some(ref auth) = config.auth {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(auth)
                    .map_err(|e| LrsError::InvalidConfig(format!("auth header: {}", e)))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Get the client configuration
    pub fn config(&self) -> &LrsConfig {
        &self.config
    }

    /// Whether terminal statements can use the keepalive path.
    ///
    /// Custom headers on a cross-origin request need a preflight, which the
    /// keepalive path cannot do, so it is only offered for same-origin LRSs.
    pub fn supports_keepalive(&self) -> bool {
        match self.config.page_origin {
            Some(ref origin) => !is_cross_origin(&self.config.endpoint, origin),
            None => true,
        }
    }

    // ==================== Statement API ====================

    /// Send a single statement
    pub async fn send_statement(&self, statement: &Statement) -> Result<()> {
        let response = self
            .client
            .post(self.statements_url())
            .header(header::CONTENT_TYPE, "application/json")
            .json(statement)
            .send()
            .await?;

        self.check_status(response).await
    }

    /// Send several statements in one request
    pub async fn send_statements(&self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }

        debug!(count = statements.len(), "Posting statement batch");
        let response = self
            .client
            .post(self.statements_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CACHE_CONTROL, "no-cache")
            .json(statements)
            .send()
            .await?;

        self.check_status(response).await
    }

    // ==================== State API ====================

    /// Fetch a state document.
    ///
    /// Any HTTP status is returned to the caller; only transport failures are errors.
    pub async fn get_state(&self, query: &StateQuery, state_id: &str) -> Result<StateDocument> {
        let response = self
            .client
            .get(self.state_url())
            .query(&state_params(query, state_id)?)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(state_id, status, "Fetched state document");
        let body = response.text().await?;
        Ok(StateDocument { status, body })
    }

    /// Store a state document, replacing any previous value
    pub async fn put_state(
        &self,
        query: &StateQuery,
        state_id: &str,
        body: &serde_json::Value,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.state_url())
            .query(&state_params(query, state_id)?)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        self.check_status(response).await
    }

    /// Delete a state document, returning the HTTP status
    pub async fn delete_state(&self, query: &StateQuery, state_id: &str) -> Result<u16> {
        let response = self
            .client
            .delete(self.state_url())
            .query(&state_params(query, state_id)?)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(state_id, status, "Deleted state document");
        Ok(status)
    }

    // === Private Implementation ===

    fn statements_url(&self) -> String {
        let mut url = format!("{}statements", self.config.endpoint);
        if !self.config.extended.is_empty() {
            let extended = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.config.extended.iter())
                .finish();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&extended);
        }
        url
    }

    fn state_url(&self) -> String {
        format!("{}activities/state", self.config.endpoint)
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(LrsError::Server {
            status: status.as_u16(),
            message: body,
        })
    }
}

fn state_params(query: &StateQuery, state_id: &str) -> Result<Vec<(&'static str, String)>> {
    let mut params = vec![
        ("activityId", query.activity_id.clone()),
        ("agent", serde_json::to_string(&query.agent)?),
        ("stateId", state_id.to_string()),
    ];
    if let Some(ref registration) = query.registration {
        params.push(("registration", registration.clone()));
    }
    Ok(params)
}

/// Whether `endpoint` is on a different origin than `page_origin`.
///
/// Scheme, host and effective port are compared. Unparsable input counts
/// as cross-origin.
pub fn is_cross_origin(endpoint: &str, page_origin: &str) -> bool {
    let (Ok(endpoint), Ok(page)) = (Url::parse(endpoint), Url::parse(page_origin)) else {
        return true;
    };

    endpoint.scheme() != page.scheme()
        || endpoint.host_str().map(str::to_lowercase) != page.host_str().map(str::to_lowercase)
        || endpoint.port_or_known_default() != page.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin_with_default_port() {
        assert!(!is_cross_origin("https://lms.example.com/xapi/", "https://lms.example.com"));
        assert!(!is_cross_origin("https://lms.example.com:443/xapi/", "https://LMS.example.com/"));
        assert!(!is_cross_origin("http://lms.example.com/xapi/", "http://lms.example.com:80"));
    }

    #[test]
    fn test_cross_origin() {
        assert!(is_cross_origin("https://lrs.example.com/xapi/", "https://lms.example.com"));
        assert!(is_cross_origin("http://lms.example.com/xapi/", "https://lms.example.com"));
        assert!(is_cross_origin("https://lms.example.com:8443/xapi/", "https://lms.example.com"));
        assert!(is_cross_origin("not a url", "https://lms.example.com"));
    }

    #[test]
    fn test_keepalive_without_page_origin() {
        let client = LrsClient::new(LrsConfig::new("https://lrs.example.com/xapi/")).unwrap();
        assert!(client.supports_keepalive());

        let client = LrsClient::new(
            LrsConfig::new("https://lrs.example.com/xapi/").with_page_origin("https://course.example.com"),
        )
        .unwrap();
        assert!(!client.supports_keepalive());
    }

    #[test]
    fn test_extended_params_on_statement_url() {
        let mut config = LrsConfig::new("https://lrs.example.com/xapi/");
        config.extended.insert("tenant".into(), "a b".into());
        let client = LrsClient::new(config).unwrap();
        assert_eq!(client.statements_url(), "https://lrs.example.com/xapi/statements?tenant=a+b");

        let mut config = LrsConfig::new("https://lrs.example.com/xapi/");
        config.extended.insert("course&id".into(), "7".into());
        config.extended.insert("tenant".into(), "x=y".into());
        let client = LrsClient::new(config).unwrap();
        assert_eq!(
            client.statements_url(),
            "https://lrs.example.com/xapi/statements?course%26id=7&tenant=x%3Dy"
        );
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let result = LrsClient::new(LrsConfig {
            endpoint: "::nope".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(LrsError::InvalidConfig(_))));
    }
}
