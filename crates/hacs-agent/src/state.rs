//! Agent state management

use std::sync::Arc;

use hacs_core::config::AgentConfig;
use hacs_core::error::RelayError;
use hacs_core::IntentEngine;

use crate::engine::HttpEngine;
use crate::identity::DeviceIdentity;
use crate::pairing::PairingCredential;
use crate::session::{GatewayConnector, GatewaySession};

/// Everything a paired agent needs to run its session
#[derive(Debug)]
pub struct AgentContext {
    /// Configuration
    pub config: AgentConfig,
    /// Device keypair
    pub identity: DeviceIdentity,
    /// Credential from the pairing exchange
    pub credential: PairingCredential,
}

impl AgentContext {
    /// Create new agent context
    pub fn new(
        config: AgentConfig,
        identity: DeviceIdentity,
        credential: PairingCredential,
    ) -> Self {
        Self {
            config,
            identity,
            credential,
        }
    }

    /// HTTP client for the configured local engine
    pub fn engine(&self) -> Result<HttpEngine, RelayError> {
        HttpEngine::from_config(&self.config)
    }

    /// Build the gateway session for this device
    pub fn gateway_session(&self, engine: Arc<dyn IntentEngine>) -> GatewaySession {
        let connector = GatewayConnector::new(&self.credential, self.config.connect_timeout);
        GatewaySession::new(connector, engine, &self.config)
    }
}
