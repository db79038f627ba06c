//! Pairing code exchange
//!
//! Converts the six-digit code a user reads off the HACS app into a session
//! credential for the gateway.
//!
//! The flow:
//! 1. User runs `hacs-agent --code 482913` or is prompted for a code
//! 2. Agent posts the code, its public key and its platform to the pairing service
//! 3. The service answers with a device id, a bearer token and the gateway URL
//!
//! Codes are single-use and short-lived, so a failed exchange is never retried
//! here; the caller asks the user for a new code instead.

use std::fmt;
use std::time::Duration;

use anyhow::Result;

use hacs_core::config::AgentConfig;
use hacs_core::error::PairingError;
use hacs_core::DeviceId;
use hacs_protocol::{PairRequest, PairResponse};

use crate::identity::DeviceIdentity;

/// Number of digits in a pairing code
pub const PAIRING_CODE_LEN: usize = 6;

/// Longest slice of a rejection body kept for diagnostics
const REJECTION_BODY_LIMIT: usize = 256;

/// Credential obtained from a successful pairing
#[derive(Clone, PartialEq, Eq)]
pub struct PairingCredential {
    /// Device id assigned by the pairing service
    pub device_id: DeviceId,
    /// Bearer token for the gateway session
    pub token: String,
    /// WebSocket URL of the gateway
    pub gateway_url: String,
    /// Token lifetime, if the service reported one
    pub expires_in: Option<Duration>,
}

impl From<PairResponse> for PairingCredential {
    fn from(resp: PairResponse) -> Self {
        Self {
            device_id: DeviceId::new(resp.device_id),
            token: resp.token,
            gateway_url: resp.ws_url,
            expires_in: resp.expires_in.map(Duration::from_secs),
        }
    }
}

impl fmt::Debug for PairingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingCredential")
            .field("device_id", &self.device_id)
            .field("token", &"<redacted>")
            .field("gateway_url", &self.gateway_url)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Check that `code` is exactly six ASCII digits
pub fn validate_code(code: &str) -> Result<(), PairingError> {
    if code.len() == PAIRING_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(PairingError::InvalidCodeFormat)
    }
}

/// Platform descriptor sent to the pairing service, `<os>/<arch>`
pub fn platform() -> String {
    format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Client for the pairing-completion endpoint
#[derive(Debug, Clone)]
pub struct PairingClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PairingClient {
    /// Create a client posting to `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PairingError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PairingError::Transport)?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Create a client from the agent configuration
    pub fn from_config(config: &AgentConfig) -> Result<Self, PairingError> {
        Self::new(config.pairing_url.clone(), config.pairing_timeout)
    }

    /// Pairing endpoint this client posts to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Exchange a pairing code for a session credential.
    ///
    /// The code is validated before anything is sent; exactly one request is
    /// made per call.
    pub async fn pair(
        &self,
        code: &str,
        identity: &DeviceIdentity,
    ) -> Result<PairingCredential, PairingError> {
        validate_code(code)?;

        let request = PairRequest {
            code: code.to_string(),
            pubkey: identity.public_key_hex(),
            platform: platform(),
        };

        tracing::debug!(
            "Sending pairing request to {} as {} ({})",
            self.endpoint,
            request.platform,
            identity.fingerprint()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(PairingError::Transport)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(REJECTION_BODY_LIMIT).collect();
            tracing::warn!("Pairing rejected with status {}", status);
            return Err(PairingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(PairingError::Transport)?;
        let pair_response: PairResponse =
            serde_json::from_slice(&bytes).map_err(PairingError::Protocol)?;

        let credential = PairingCredential::from(pair_response);
        tracing::info!("Paired successfully! Device ID: {}", credential.device_id);
        Ok(credential)
    }
}

/// Prompt the user to enter a pairing code from stdin
///
/// Returns the trimmed input; format validation is left to [`PairingClient::pair`]
/// so that a bad code goes through the same error path as a rejected one.
pub fn prompt_pairing_code() -> Result<String> {
    use std::io::{self, Write};

    print!("Enter 6-digit pairing code: ");
    io::stdout().flush()?;

    let mut code = String::new();
    if io::stdin().read_line(&mut code)? == 0 {
        anyhow::bail!("stdin closed before a pairing code was entered");
    }

    Ok(code.trim().to_string())
}
