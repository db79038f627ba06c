//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding gateway frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a JSON object with a string `type` field
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Well-formed frame with a `type` this agent does not understand
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Known message type whose fields failed to decode.
    ///
    /// `req_id` is set for an `act` that still carries a usable correlation
    /// id, so the session can answer it.
    #[error("Invalid {kind} message: {source}")]
    InvalidPayload {
        kind: String,
        req_id: Option<String>,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization of an outbound message failed
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Whether the error means the byte stream itself can no longer be trusted.
    ///
    /// Unknown or invalid messages are skipped by the session; a malformed
    /// frame ends the read loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Malformed(_))
    }
}
