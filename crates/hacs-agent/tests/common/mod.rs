//! Shared fixtures for the agent integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use hacs_agent::PairingCredential;
use hacs_core::config::{AgentConfig, BackoffConfig};
use hacs_core::error::RelayError;
use hacs_core::{DeviceId, IntentEngine};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Server side of one gateway connection
pub type GatewayConn = WebSocketStream<TcpStream>;

/// Mock gateway accepting agent WebSocket connections
pub struct MockGateway {
    pub url: String,
    connections: mpsc::UnboundedReceiver<GatewayConn>,
    attempts: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

impl MockGateway {
    /// Start a gateway that accepts every handshake
    pub async fn start() -> Self {
        Self::rejecting(0).await
    }

    /// Start a gateway that answers the first `rejections` handshakes with 503
    pub async fn rejecting(rejections: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock gateway");
        let url = format!("ws://{}/session", listener.local_addr().unwrap());

        let (conn_tx, connections) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let auth_headers = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&attempts);
        let headers = Arc::clone(&auth_headers);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                let headers = Arc::clone(&headers);

                let callback = move |req: &Request, resp: Response| {
                    if let Some(auth) = req.headers().get("authorization") {
                        headers
                            .lock()
                            .unwrap()
                            .push(auth.to_str().unwrap().to_string());
                    }
                    if attempt < rejections {
                        let mut rejected = ErrorResponse::new(Some("unavailable".to_string()));
                        *rejected.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                        return Err(rejected);
                    }
                    Ok(resp)
                };

                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    let _ = conn_tx.send(ws);
                }
            }
        });

        Self {
            url,
            connections,
            attempts,
            auth_headers,
        }
    }

    /// Wait for the agent's next successful connection
    pub async fn accept(&mut self) -> GatewayConn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("Agent did not connect in time")
            .expect("Mock gateway stopped")
    }

    /// TCP connections seen so far, rejected ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.auth_headers.lock().unwrap().clone()
    }

    pub fn credential(&self) -> PairingCredential {
        PairingCredential {
            device_id: DeviceId::new("dev-test"),
            token: "tok-test".to_string(),
            gateway_url: self.url.clone(),
            expires_in: None,
        }
    }
}

/// Send a JSON value as a text frame
pub async fn send_json(conn: &mut GatewayConn, value: Value) {
    conn.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame to agent");
}

/// Next text frame from the agent, decoded as JSON
pub async fn recv_json(conn: &mut GatewayConn) -> Value {
    recv_json_within(conn, WAIT)
        .await
        .expect("No frame from agent in time")
}

/// Next text frame from the agent, or `None` if nothing arrives within `limit`
pub async fn recv_json_within(conn: &mut GatewayConn, limit: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let next = tokio::time::timeout_at(deadline, conn.next()).await.ok()?;
        match next {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).expect("Agent sent invalid JSON"))
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("Gateway read failed: {}", e),
        }
    }
}

/// Agent configuration with short timers for tests
pub fn test_config() -> AgentConfig {
    AgentConfig {
        connect_timeout: Duration::from_secs(2),
        backoff: BackoffConfig {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(400),
            multiplier: 2.0,
            jitter: 0.0,
        },
        shutdown_grace: Duration::from_secs(1),
        ..AgentConfig::default()
    }
}

/// Engine answering every intent from a closure
pub struct FnEngine<F>(pub F);

#[async_trait]
impl<F> IntentEngine for FnEngine<F>
where
    F: Fn(&str) -> Result<Value, RelayError> + Send + Sync + 'static,
{
    async fn act(&self, text: &str) -> Result<Value, RelayError> {
        (self.0)(text)
    }
}

/// Engine that holds every call until released
pub struct GatedEngine {
    open: watch::Sender<bool>,
    calls: AtomicUsize,
}

impl GatedEngine {
    pub fn new() -> Self {
        Self {
            open: watch::channel(false).0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Release every waiting call; later calls pass straight through
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentEngine for GatedEngine {
    async fn act(&self, text: &str) -> Result<Value, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        Ok(serde_json::json!({ "done": text }))
    }
}

/// Serve `router` on a random local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", address)
}

/// A local port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
