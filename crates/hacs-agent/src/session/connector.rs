//! Outbound WebSocket connector
//!
//! Dials the gateway and performs the authenticated handshake. Retrying is
//! left to the session, which owns the backoff and the connection state.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use hacs_protocol::ProtocolError;

use crate::pairing::PairingCredential;

/// WebSocket stream to the gateway
pub type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection errors. None of them are fatal: every one leads to a reconnect.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Gateway URL or token cannot form a handshake request
    #[error("Invalid gateway request: {0}")]
    InvalidRequest(String),

    /// Dial and handshake did not finish in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Dial or WebSocket handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    /// Reading from the connection failed
    #[error("Read failed: {0}")]
    Read(#[source] tokio_tungstenite::tungstenite::Error),

    /// Writing to the connection failed
    #[error("Write failed: {0}")]
    Write(#[source] tokio_tungstenite::tungstenite::Error),

    /// Gateway closed the connection
    #[error("Connection closed by gateway")]
    Closed,

    /// No frame arrived within the heartbeat timeout
    #[error("No frame from gateway for {0:?}")]
    IdleTimeout(Duration),

    /// Writer did not flush and close within the shutdown grace period
    #[error("Writer did not close within {0:?}")]
    FlushTimeout(Duration),

    /// Gateway sent a frame that is not a protocol message
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Establishes authenticated WebSocket connections to the gateway
#[derive(Clone)]
pub struct GatewayConnector {
    url: String,
    token: String,
    connect_timeout: Duration,
}

impl GatewayConnector {
    /// Create a connector for the gateway named in `credential`
    pub fn new(credential: &PairingCredential, connect_timeout: Duration) -> Self {
        Self {
            url: credential.gateway_url.clone(),
            token: credential.token.clone(),
            connect_timeout,
        }
    }

    /// Gateway URL
    pub fn gateway_url(&self) -> &str {
        &self.url
    }

    /// Build the handshake request carrying the bearer token
    pub fn request(&self) -> Result<Request, ConnectionError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        Ok(request)
    }

    /// Attempt a single connection to the gateway
    pub async fn try_connect(&self) -> Result<GatewayStream, ConnectionError> {
        let request = self.request()?;

        tracing::debug!("Connecting to {}", self.url);
        let (stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))?
            .map_err(ConnectionError::Handshake)?;

        tracing::debug!("Handshake complete (HTTP {})", response.status());
        Ok(stream)
    }
}

impl std::fmt::Debug for GatewayConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnector")
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
