//! HTTP client for the local engine

use std::time::Duration;

use async_trait::async_trait;

use hacs_core::config::AgentConfig;
use hacs_core::error::RelayError;
use hacs_core::IntentEngine;
use hacs_protocol::EngineRequest;

/// Local engine reached over HTTP on the loopback interface
#[derive(Debug, Clone)]
pub struct HttpEngine {
    http: reqwest::Client,
    url: String,
}

impl HttpEngine {
    /// Create an engine client posting to `url` with a per-call timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, RelayError> {
        Self::new(config.engine_url.clone(), config.engine_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IntentEngine for HttpEngine {
    async fn act(&self, text: &str) -> Result<serde_json::Value, RelayError> {
        let response = self
            .http
            .post(&self.url)
            .json(&EngineRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| RelayError::Unavailable(e.to_string()))?;

        // The body is forwarded whatever the status; the engine reports its
        // own failures as JSON.
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Local engine answered with status {}", status);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| RelayError::InvalidResponse(e.to_string()))
    }
}
