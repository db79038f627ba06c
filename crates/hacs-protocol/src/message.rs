//! Message types for the gateway session
//!
//! Every frame on the session is a JSON object with a `type` discriminator.
//!
//! # Message Flow
//!
//! 1. Agent opens the WebSocket with `Authorization: Bearer <token>`
//! 2. Gateway sends `ping` periodically, agent answers each with `pong`
//! 3. Gateway sends `act` with a `req_id` and the intent text
//! 4. Agent answers each `act` with one `act_result` carrying the same `req_id`
//!
//! `act_result` messages may arrive at the gateway in any order relative to
//! each other; `req_id` is the only correlation the agent guarantees.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message type identifier, as it appears in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Gateway heartbeat
    Ping,
    /// Heartbeat reply
    Pong,
    /// Intent request from the gateway
    Act,
    /// Intent result from the agent
    ActResult,
}

impl MessageType {
    /// Wire name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Act => "act",
            MessageType::ActResult => "act_result",
        }
    }

    /// Parse a wire name
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "ping" => Some(Self::Ping),
            "pong" => Some(Self::Pong),
            "act" => Some(Self::Act),
            "act_result" => Some(Self::ActResult),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway session messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Heartbeat from the gateway
    Ping,

    /// Heartbeat reply
    Pong,

    /// Request to act on an intent
    Act {
        /// Correlation id chosen by the gateway
        req_id: String,
        /// Intent text; a missing field is read as empty
        #[serde(default)]
        text: String,
    },

    /// Result of an intent
    ActResult {
        /// Correlation id of the originating `act`
        req_id: String,
        /// Engine output, or an `{"error": ...}` object
        result: serde_json::Value,
        /// True when produced by the on-device engine rather than a cloud fallback
        local: bool,
    },
}

impl GatewayMessage {
    /// Build a result message produced by the local engine
    pub fn act_result(req_id: impl Into<String>, result: serde_json::Value) -> Self {
        GatewayMessage::ActResult {
            req_id: req_id.into(),
            result,
            local: true,
        }
    }

    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            GatewayMessage::Ping => MessageType::Ping,
            GatewayMessage::Pong => MessageType::Pong,
            GatewayMessage::Act { .. } => MessageType::Act,
            GatewayMessage::ActResult { .. } => MessageType::ActResult,
        }
    }

    /// Correlation id, for messages that carry one
    pub fn req_id(&self) -> Option<&str> {
        match self {
            GatewayMessage::Act { req_id, .. } | GatewayMessage::ActResult { req_id, .. } => {
                Some(req_id)
            }
            _ => None,
        }
    }
}
