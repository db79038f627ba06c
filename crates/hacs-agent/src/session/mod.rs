//! Gateway session
//!
//! Owns the persistent connection to the gateway: connect with backoff,
//! answer heartbeats, hand intents to the relay, detect loss and reconnect,
//! and close gracefully when cancelled.

mod connector;
mod link;
mod reconnect;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use hacs_core::config::AgentConfig;
use hacs_core::error::RelayError;
use hacs_core::{ConnectionState, Generation, IntentEngine, SessionStatus};
use hacs_protocol::{decode_message, GatewayMessage, ProtocolError};

use crate::relay::IntentRelay;

pub use connector::{ConnectionError, GatewayConnector, GatewayStream};
pub use link::{Delivery, LinkRegistry, ResultLink};
pub use reconnect::ExponentialBackoff;
pub use writer::ConnectionWriter;

/// Why a connected period ended
enum Disconnect {
    /// Connection failed or was closed by the gateway; reconnect
    Lost(ConnectionError),
    /// Shutdown was requested; the session is finished
    Shutdown,
}

/// How the read loop of one connection ended
enum ReadEnd {
    Cancelled,
    Lost(ConnectionError),
    WriterExited,
}

/// The persistent gateway connection and its state machine
pub struct GatewaySession {
    connector: GatewayConnector,
    backoff: ExponentialBackoff,
    reset_backoff_on_connect: bool,
    heartbeat_timeout: Option<Duration>,
    outbound_queue_capacity: usize,
    shutdown_grace: Duration,
    relay: IntentRelay,
    links: Arc<LinkRegistry>,
    generation: Generation,
    status: watch::Sender<SessionStatus>,
}

impl GatewaySession {
    /// Create a session that relays intents to `engine`
    pub fn new(
        connector: GatewayConnector,
        engine: Arc<dyn IntentEngine>,
        config: &AgentConfig,
    ) -> Self {
        let backoff = ExponentialBackoff::from_config(&config.backoff);
        let links = Arc::new(LinkRegistry::new());
        let relay = IntentRelay::new(engine, Arc::clone(&links), config.max_in_flight_intents);
        let (status, _) = watch::channel(SessionStatus::initial(backoff.current()));

        Self {
            connector,
            backoff,
            reset_backoff_on_connect: config.reset_backoff_on_connect,
            heartbeat_timeout: config.heartbeat_timeout,
            outbound_queue_capacity: config.outbound_queue_capacity,
            shutdown_grace: config.shutdown_grace,
            relay,
            links,
            generation: Generation::NONE,
            status,
        }
    }

    /// Observe the session state
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Run until `cancel` fires.
    ///
    /// Connection failures are never returned; they lead to a reconnect after
    /// the backoff delay.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Starting gateway session to {}", self.connector.gateway_url());

        loop {
            let Some(stream) = self.connect_with_retry(&cancel).await else {
                self.close_disconnected().await;
                return;
            };

            self.generation = self.generation.next();
            if self.reset_backoff_on_connect {
                self.backoff.reset();
            }

            match self.serve(stream, &cancel).await {
                Disconnect::Shutdown => return,
                Disconnect::Lost(e) => {
                    tracing::warn!("Disconnected from gateway: {}", e);
                    self.publish(ConnectionState::Disconnected, self.backoff.current());
                }
            }
        }
    }

    /// Dial until a connection succeeds; `None` if cancelled first
    async fn connect_with_retry(&mut self, cancel: &CancellationToken) -> Option<GatewayStream> {
        loop {
            self.publish(ConnectionState::Connecting, self.backoff.current());

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.connector.try_connect() => result,
            };

            match attempt {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    self.publish(ConnectionState::Disconnected, delay);
                    tracing::warn!("Connection failed: {}. Retrying in {:?}", e, delay);

                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Serve one established connection until it ends
    async fn serve(&self, stream: GatewayStream, cancel: &CancellationToken) -> Disconnect {
        let generation = self.generation;
        let (sink, mut stream) = stream.split();
        let (writer, results_tx) = ConnectionWriter::spawn(sink, self.outbound_queue_capacity);
        let link = ResultLink::new(generation, results_tx);

        self.links.install(link.clone());
        self.publish(ConnectionState::Connected, self.backoff.current());
        tracing::info!(
            "Connected to gateway at {} (generation {})",
            self.connector.gateway_url(),
            generation
        );

        let end = loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break ReadEnd::Cancelled,
                _ = writer.closed() => break ReadEnd::WriterExited,
                frame = next_frame(&mut stream, self.heartbeat_timeout) => frame,
            };

            let outcome = match frame {
                Ok(text) => self.handle_frame(&text, &writer, &link).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                break ReadEnd::Lost(e);
            }
        };

        drop(link);
        match end {
            ReadEnd::Cancelled => {
                self.publish(ConnectionState::Closing, self.backoff.current());
                tracing::info!("Shutting down gateway session");

                self.relay.drain(self.shutdown_grace).await;
                self.links.clear(generation);
                if let Err(e) = writer.shutdown(self.shutdown_grace).await {
                    tracing::debug!("Connection closed uncleanly: {}", e);
                }

                self.publish(ConnectionState::Disconnected, self.backoff.current());
                Disconnect::Shutdown
            }
            ReadEnd::Lost(e) => {
                self.links.clear(generation);
                writer.stop_now();
                if let Err(e) = writer.shutdown(self.shutdown_grace).await {
                    tracing::debug!("Writer ended with: {}", e);
                }
                Disconnect::Lost(e)
            }
            ReadEnd::WriterExited => {
                self.links.clear(generation);
                let e = match writer.shutdown(self.shutdown_grace).await {
                    Err(e) => e,
                    Ok(()) => ConnectionError::Closed,
                };
                Disconnect::Lost(e)
            }
        }
    }

    /// Handle one inbound frame. An error ends the connection.
    async fn handle_frame(
        &self,
        text: &str,
        writer: &ConnectionWriter,
        link: &ResultLink,
    ) -> Result<(), ConnectionError> {
        match decode_message(text) {
            Ok(GatewayMessage::Ping) => {
                tracing::trace!("Ping received, sending pong");
                writer.send_control(GatewayMessage::Pong).await?;
            }
            Ok(GatewayMessage::Act { req_id, text }) => {
                tracing::debug!("Intent {} received", req_id);
                self.relay.dispatch(req_id, text, link.clone());
            }
            Ok(other) => {
                tracing::warn!(
                    "Ignoring unexpected {} message from gateway",
                    other.message_type().as_str()
                );
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(ProtocolError::InvalidPayload {
                req_id: Some(req_id),
                source,
                ..
            }) => {
                tracing::warn!("Intent {} could not be decoded: {}", req_id, source);
                let error = RelayError::InvalidRequest(source.to_string());
                self.relay.reject(req_id, &error, link);
            }
            Err(e) => tracing::warn!("Ignoring frame: {}", e),
        }
        Ok(())
    }

    /// Shutdown requested while no connection was up
    async fn close_disconnected(&self) {
        self.publish(ConnectionState::Closing, self.backoff.current());
        tracing::info!("Shutting down gateway session");
        self.relay.drain(self.shutdown_grace).await;
        self.publish(ConnectionState::Disconnected, self.backoff.current());
    }

    fn publish(&self, state: ConnectionState, backoff: Duration) {
        let previous = self.status.send_replace(SessionStatus {
            state,
            generation: self.generation,
            backoff,
        });
        if previous.state != state {
            tracing::info!("Session state: {} -> {}", previous.state, state);
        }
    }
}

/// Wait for the next text payload, skipping transport control frames
async fn next_frame<S>(stream: &mut S, idle: Option<Duration>) -> Result<String, ConnectionError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let next = match idle {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| ConnectionError::IdleTimeout(limit))?,
            None => stream.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => {
                return String::from_utf8(data.to_vec()).map_err(|e| {
                    ProtocolError::Malformed(format!("binary frame is not UTF-8: {}", e)).into()
                });
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!("Close frame received: {:?}", frame);
                return Err(ConnectionError::Closed);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ConnectionError::Read(e)),
            None => return Err(ConnectionError::Closed),
        }
    }
}
