//! Intent relay
//!
//! Bridges `act` messages from the gateway to the local engine. Each intent
//! runs as its own task: one engine call, then one `act_result` handed to the
//! writer of the connection the intent arrived on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use hacs_core::error::RelayError;
use hacs_core::IntentEngine;
use hacs_protocol::GatewayMessage;

use crate::session::{Delivery, LinkRegistry, ResultLink};

/// Dispatches intents to the engine with bounded concurrency
pub struct IntentRelay {
    engine: Arc<dyn IntentEngine>,
    links: Arc<LinkRegistry>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl IntentRelay {
    /// Create a relay allowing at most `max_in_flight` concurrent engine calls
    pub fn new(
        engine: Arc<dyn IntentEngine>,
        links: Arc<LinkRegistry>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            engine,
            links,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: TaskTracker::new(),
        }
    }

    /// Start relaying one intent without waiting for it.
    ///
    /// An intent over the concurrency limit is answered at once with a busy
    /// error so the gateway still gets a result for `req_id`. No task is
    /// spawned for it.
    pub fn dispatch(&self, req_id: String, text: String, link: ResultLink) {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            tracing::warn!(req_id = %req_id, "Too many intents in flight, answering busy");
            self.reject(req_id, &RelayError::Busy, &link);
            return;
        };

        let span = tracing::info_span!("intent", req_id = %req_id, generation = %link.generation());
        let links = Arc::clone(&self.links);
        let engine = Arc::clone(&self.engine);
        self.tasks.spawn(
            async move {
                relay(req_id, text, engine.as_ref(), &links, &link).await;
                drop(permit);
            }
            .instrument(span),
        );
    }

    /// Answer `req_id` with an error payload without calling the engine.
    ///
    /// Runs on the caller's task and never waits; if the result lane is full
    /// the answer is dropped.
    pub fn reject(&self, req_id: String, error: &RelayError, link: &ResultLink) -> Delivery {
        let msg = GatewayMessage::act_result(req_id, error.payload());
        let delivery = self.links.try_deliver(link, msg);
        report(delivery);
        delivery
    }

    /// Number of relay tasks still running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait up to `grace` for running relays to finish.
    ///
    /// Returns `false` if some were still running when the grace period ended.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        let finished = tokio::time::timeout(grace, self.tasks.wait()).await.is_ok();
        self.tasks.reopen();

        if !finished {
            tracing::warn!(
                "{} intent(s) still in flight after {:?}",
                self.tasks.len(),
                grace
            );
        }
        finished
    }
}

/// Call the engine and build the `act_result` for `req_id`
pub async fn resolve(engine: &dyn IntentEngine, req_id: String, text: &str) -> GatewayMessage {
    let result = match engine.act(text).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Engine call failed: {}", e);
            e.payload()
        }
    };
    GatewayMessage::act_result(req_id, result)
}

/// Relay one intent end to end.
///
/// Never fails: engine errors become error payloads, and a result whose
/// connection has been replaced is discarded.
pub async fn relay(
    req_id: String,
    text: String,
    engine: &dyn IntentEngine,
    links: &LinkRegistry,
    link: &ResultLink,
) -> Delivery {
    tracing::debug!("Relaying intent to engine");
    let msg = resolve(engine, req_id, &text).await;
    let delivery = links.deliver(link, msg).await;
    report(delivery);
    delivery
}

fn report(delivery: Delivery) {
    match delivery {
        Delivery::Queued => tracing::trace!("Result queued"),
        Delivery::Stale { current } => {
            tracing::debug!(
                "Discarding result, connection was replaced (current: {:?})",
                current
            )
        }
        Delivery::Closed => tracing::debug!("Discarding result, connection writer has exited"),
        Delivery::Full => tracing::warn!("Discarding result, outbound queue is full"),
    }
}
