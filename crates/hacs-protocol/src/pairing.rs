//! Pairing service request and response bodies

use serde::{Deserialize, Serialize};

/// Body of `POST /pair/finish`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRequest {
    /// Six-digit code shown to the user
    pub code: String,
    /// Hex-encoded Ed25519 public key of the device
    pub pubkey: String,
    /// Platform descriptor, `<os>/<arch>`
    pub platform: String,
}

/// Successful pairing response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResponse {
    pub device_id: String,
    pub token: String,
    pub ws_url: String,
    /// Token lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}
