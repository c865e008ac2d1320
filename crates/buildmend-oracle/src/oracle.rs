//! HTTP change-proposal oracle.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use buildmend_core::{ChangeProposalOracle, Diagnostic, EndpointConfig, MendError, ProposalRequest, Result};
use serde::Serialize;
use tracing::info;

use crate::client::{HttpConfig, JsonClient};

/// Request body sent to the oracle endpoint.
#[derive(Debug, Serialize)]
struct ProposalBody<'a> {
    diagnostics: &'a [Diagnostic],
    files: &'a BTreeMap<String, String>,
    /// Diagnostics rendered one per line, ready to drop into a prompt.
    summary: String,
}

/// Posts diagnostics and file contents to an endpoint and returns its reply
/// verbatim. Validation happens in the repair loop.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: JsonClient,
}

impl HttpOracle {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = JsonClient::new(config)
            .map_err(|e| MendError::InvalidConfig(format!("oracle client: {e}")))?;
        Ok(HttpOracle { client })
    }

    /// Build from the `[oracle]` section of the session config.
    pub fn from_config(config: &EndpointConfig, timeout: Duration) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| MendError::InvalidConfig("oracle.endpoint is not set".to_string()))?;
        let mut http = HttpConfig::new(endpoint, timeout);
        if let Some(token) = &config.token {
            http = http.with_token(token);
        }
        Self::new(http)
    }
}

#[async_trait]
impl ChangeProposalOracle for HttpOracle {
    async fn propose(&self, request: &ProposalRequest) -> Result<String> {
        info!(
            endpoint = %self.client.endpoint(),
            diagnostics = request.diagnostics.len(),
            files = request.files.len(),
            "requesting proposal"
        );
        let body = ProposalBody {
            diagnostics: &request.diagnostics,
            files: &request.files,
            summary: request.summary(),
        };
        self.client.post(&body).await.map_err(MendError::OracleFailure)
    }
}
