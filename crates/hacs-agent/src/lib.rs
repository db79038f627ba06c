//! hacs-agent: Device agent for HACS
//!
//! The agent gives the machine an Ed25519 identity, pairs it with the user's
//! account using a short code, then keeps a WebSocket session open to the
//! gateway and relays intents from it to the local engine.

pub mod engine;
pub mod identity;
pub mod pairing;
pub mod relay;
pub mod session;
pub mod state;

pub use engine::HttpEngine;
pub use identity::{DeviceIdentity, IdentityStore};
pub use pairing::{prompt_pairing_code, PairingClient, PairingCredential};
pub use relay::IntentRelay;
pub use session::{GatewayConnector, GatewaySession};
pub use state::AgentContext;
