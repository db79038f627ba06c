//! hacs-protocol: Wire protocol for the HACS device agent
//!
//! This crate defines the JSON messages exchanged between the agent and the
//! cloud gateway over the persistent WebSocket session, plus the request and
//! response bodies of the pairing service and the local engine.

pub mod codec;
pub mod engine;
pub mod error;
pub mod message;
pub mod pairing;

pub use codec::{decode_message, encode_message};
pub use engine::{
    error_payload, EngineRequest, ERROR_BUSY, ERROR_INVALID_REQUEST, ERROR_INVALID_RESPONSE,
    ERROR_UNAVAILABLE,
};
pub use error::ProtocolError;
pub use message::{GatewayMessage, MessageType};
pub use pairing::{PairRequest, PairResponse};
