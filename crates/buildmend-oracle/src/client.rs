//! Shared HTTP plumbing.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("buildmend/", env!("CARGO_PKG_VERSION"));

/// Endpoint settings for one HTTP collaborator.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Full URL that receives the POST.
    pub endpoint: String,
    /// Bearer token (optional for unauthenticated endpoints)
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        HttpConfig {
            endpoint: endpoint.to_string(),
            token: None,
            timeout,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// A JSON-over-HTTP client bound to one endpoint.
#[derive(Debug, Clone)]
pub(crate) struct JsonClient {
    config: HttpConfig,
    http_client: reqwest::Client,
}

impl JsonClient {
    pub(crate) fn new(config: HttpConfig) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(JsonClient { config, http_client })
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// POST `body` as JSON and return the response text.
    ///
    /// Non-success statuses are errors carrying the status and body.
    pub(crate) async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<String, String> {
        let mut request = self.http_client.post(&self.config.endpoint).json(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        debug!(endpoint = %self.config.endpoint, status = %status, bytes = text.len(), "response received");

        if !status.is_success() {
            return Err(format!("{} returned {status}: {}", self.config.endpoint, text.trim()));
        }
        Ok(text)
    }
}
