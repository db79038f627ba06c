//! Core error types for the HACS agent

use hacs_protocol::{
    error_payload, ERROR_BUSY, ERROR_INVALID_REQUEST, ERROR_INVALID_RESPONSE, ERROR_UNAVAILABLE,
};
use std::path::PathBuf;
use thiserror::Error;

/// Persisted key material could not be used
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Reading or writing a key file failed
    #[error("Key file {path} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key file has the wrong length
    #[error("Key file {path} is corrupt: expected {expected} bytes, found {actual}")]
    Corrupt {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Key bytes have the right length but are not a valid key
    #[error("Key file {path} holds an invalid key: {reason}")]
    InvalidKey { path: PathBuf, reason: String },

    /// Stored public key does not belong to the stored private key
    #[error("Public key in {path} does not match the private key")]
    Mismatch { path: PathBuf },

    /// Public key exists without its private key
    #[error("Private key {path} is missing but a public key is present")]
    MissingPrivateKey { path: PathBuf },

    /// Refusing to follow a symlinked key file
    #[error("Refusing to use key file {path}: path is a symlink")]
    Symlink { path: PathBuf },
}

/// Errors from the pairing handshake
#[derive(Error, Debug)]
pub enum PairingError {
    /// Code is not exactly six ASCII digits
    #[error("Invalid code format: pairing code must be exactly 6 digits")]
    InvalidCodeFormat,

    /// Pairing service could not be reached
    #[error("Pairing request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Pairing service answered with a non-200 status
    #[error("Pairing rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Pairing service answered 200 with an undecodable body
    #[error("Pairing response could not be decoded: {0}")]
    Protocol(#[source] serde_json::Error),
}

impl PairingError {
    /// Whether the caller should ask for a new code instead of giving up.
    ///
    /// Every pairing failure leaves the device identity intact, so all of
    /// them can be retried with a fresh code.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PairingError::InvalidCodeFormat
            | PairingError::Transport(_)
            | PairingError::Rejected { .. }
            | PairingError::Protocol(_) => true,
        }
    }
}

/// Failure to obtain a result from the local engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Engine unreachable, refused or timed out
    #[error("Local engine unavailable: {0}")]
    Unavailable(String),

    /// Engine answered with a body that is not JSON
    #[error("Local engine returned an invalid response: {0}")]
    InvalidResponse(String),

    /// Too many intents already in flight
    #[error("Local engine is busy")]
    Busy,

    /// The `act` itself could not be decoded, so the engine was never called
    #[error("Invalid intent request: {0}")]
    InvalidRequest(String),
}

impl RelayError {
    /// The `result` value sent to the gateway in place of an engine result
    pub fn payload(&self) -> serde_json::Value {
        let message = match self {
            RelayError::Unavailable(_) => ERROR_UNAVAILABLE,
            RelayError::InvalidResponse(_) => ERROR_INVALID_RESPONSE,
            RelayError::Busy => ERROR_BUSY,
            RelayError::InvalidRequest(_) => ERROR_INVALID_REQUEST,
        };
        error_payload(message)
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
