//! JSON text codec for gateway frames
//!
//! Decoding happens in two steps so the session can tell a corrupt frame
//! (fatal for the connection) from a message it simply does not understand
//! (logged and skipped).

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::{GatewayMessage, MessageType};

/// Encode a message as a JSON text frame
pub fn encode_message(message: &GatewayMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Decode a JSON text frame into a message
pub fn decode_message(text: &str) -> Result<GatewayMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => {
            return Err(ProtocolError::Malformed(
                "`type` field is not a string".to_string(),
            ))
        }
        None => return Err(ProtocolError::Malformed("missing `type` field".to_string())),
    };

    let Some(msg_type) = MessageType::from_wire(&kind) else {
        return Err(ProtocolError::UnknownMessageType(kind));
    };

    GatewayMessage::deserialize(&value).map_err(|source| {
        let req_id = match msg_type {
            MessageType::Act => value
                .get("req_id")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        };
        ProtocolError::InvalidPayload {
            kind,
            req_id,
            source,
        }
    })
}
