//! Local engine request body and the error payloads sent in its place

use serde::{Deserialize, Serialize};

/// Error text when the local engine cannot be reached
pub const ERROR_UNAVAILABLE: &str = "Local core unavailable";

/// Error text when the local engine answers with something that is not JSON
pub const ERROR_INVALID_RESPONSE: &str = "Invalid response from local core";

/// Error text when the agent is already running its maximum number of intents
pub const ERROR_BUSY: &str = "Local core busy";

/// Error text for an `act` whose fields could not be decoded
pub const ERROR_INVALID_REQUEST: &str = "Invalid intent request";

/// Body of `POST /act` on the local engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub text: String,
}

/// Build the `{"error": ...}` payload used in place of an engine result
pub fn error_payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}
