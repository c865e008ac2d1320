//! HTTP changeset generator.

use std::time::Duration;

use async_trait::async_trait;
use buildmend_core::{ChangesetSource, GeneratorConfig, MendError, Result};
use serde::Serialize;
use tracing::info;

use crate::client::{HttpConfig, JsonClient};

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    requirement: &'a str,
    attempt: u32,
}

/// Asks an upstream generator for a fresh changeset on every outer attempt.
#[derive(Debug, Clone)]
pub struct HttpChangesetSource {
    client: JsonClient,
    requirement: String,
}

impl HttpChangesetSource {
    pub fn new(config: HttpConfig, requirement: impl Into<String>) -> Result<Self> {
        let client = JsonClient::new(config)
            .map_err(|e| MendError::InvalidConfig(format!("generator client: {e}")))?;
        Ok(HttpChangesetSource {
            client,
            requirement: requirement.into(),
        })
    }

    /// Build from the `[generator]` section of the session config.
    pub fn from_config(config: &GeneratorConfig, timeout: Duration) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| MendError::InvalidConfig("generator.endpoint is not set".to_string()))?;
        let requirement = config
            .requirement
            .as_deref()
            .ok_or_else(|| MendError::InvalidConfig("generator.requirement is not set".to_string()))?;
        let mut http = HttpConfig::new(endpoint, timeout);
        if let Some(token) = &config.token {
            http = http.with_token(token);
        }
        Self::new(http, requirement)
    }
}

#[async_trait]
impl ChangesetSource for HttpChangesetSource {
    async fn next_changeset(&self, attempt: u32) -> Result<String> {
        info!(endpoint = %self.client.endpoint(), attempt, "requesting changeset");
        let body = GenerationBody {
            requirement: &self.requirement,
            attempt,
        };
        self.client.post(&body).await.map_err(MendError::Generation)
    }
}
