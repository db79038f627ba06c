//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::backoff::BackoffConfig;
use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;

/// Pairing service endpoint used when none is configured
pub const DEFAULT_PAIRING_URL: &str = "https://pair.hacs.world/pair/finish";

/// Local engine endpoint used when none is configured
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:8000/act";

/// Configuration for the device agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Pairing-completion endpoint
    pub pairing_url: String,

    /// Timeout for the pairing request
    #[serde(with = "duration_secs")]
    pub pairing_timeout: Duration,

    /// Directory holding `device.key` and `device.pub`
    pub identity_dir: PathBuf,

    /// Local engine `act` endpoint
    pub engine_url: String,

    /// Timeout for one local engine call
    #[serde(with = "duration_secs")]
    pub engine_timeout: Duration,

    /// Timeout for the gateway dial and WebSocket handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Drop the connection when no frame arrives for this long.
    ///
    /// The gateway pings periodically, so silence means a dead link.
    #[serde(with = "option_duration_secs")]
    pub heartbeat_timeout: Option<Duration>,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,

    /// Reset the backoff to its initial delay after every successful connect.
    ///
    /// When false, the delay keeps growing across the whole session lifetime.
    pub reset_backoff_on_connect: bool,

    /// Maximum number of intents relayed concurrently
    pub max_in_flight_intents: usize,

    /// Capacity of each outbound queue of the connection writer
    pub outbound_queue_capacity: usize,

    /// How long shutdown waits for in-flight intents
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            pairing_url: DEFAULT_PAIRING_URL.to_string(),
            pairing_timeout: Duration::from_secs(30),
            identity_dir: default_identity_dir(),
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            engine_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            heartbeat_timeout: Some(Duration::from_secs(90)),
            backoff: BackoffConfig::default(),
            reset_backoff_on_connect: true,
            max_in_flight_intents: 64,
            outbound_queue_capacity: 256,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff.validate().map_err(ConfigError::Invalid)?;

        if self.max_in_flight_intents == 0 {
            return Err(ConfigError::Invalid(
                "max_in_flight_intents must be at least 1".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pairing_url.is_empty() || self.engine_url.is_empty() {
            return Err(ConfigError::Invalid(
                "pairing_url and engine_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-user directory for the device keypair (`~/.hacs`)
pub fn default_identity_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".hacs")
}
