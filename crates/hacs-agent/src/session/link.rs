//! Result routing between relays and the live connection
//!
//! Every connection gets a [`ResultLink`] tagged with its generation. A relay
//! captures the link that was current when its `act` arrived and, once the
//! engine answers, delivers only if that link is still the current one. A
//! result for a connection that has since been replaced is dropped.

use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use hacs_core::Generation;
use hacs_protocol::GatewayMessage;

/// Outbound result lane of one connection
#[derive(Debug, Clone)]
pub struct ResultLink {
    generation: Generation,
    tx: mpsc::Sender<GatewayMessage>,
}

impl ResultLink {
    /// Bind a result lane to the connection generation it belongs to
    pub fn new(generation: Generation, tx: mpsc::Sender<GatewayMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

/// Outcome of handing a result to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer of the originating connection
    Queued,
    /// The originating connection is gone; `current` is its replacement, if any
    Stale { current: Option<Generation> },
    /// The originating connection is still current but its writer has exited
    Closed,
    /// The result lane was full and the message was dropped
    Full,
}

/// Holds the result link of the current connection
#[derive(Debug, Default)]
pub struct LinkRegistry {
    current: RwLock<Option<ResultLink>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `link` the current one, replacing any previous link
    pub fn install(&self, link: ResultLink) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(link);
    }

    /// Clear the current link if it still belongs to `generation`
    pub fn clear(&self, generation: Generation) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|link| link.generation == generation)
        {
            *current = None;
        }
    }

    /// Snapshot of the current link
    pub fn current(&self) -> Option<ResultLink> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_generation(&self) -> Option<Generation> {
        self.current().map(|link| link.generation)
    }

    /// Deliver `msg` through `link` if it is still the current connection.
    ///
    /// The lock is released before awaiting queue capacity; a rotation that
    /// happens while waiting is caught because the old writer's receiver is
    /// dropped and the send fails.
    pub async fn deliver(&self, link: &ResultLink, msg: GatewayMessage) -> Delivery {
        let current = self.current_generation();
        if current != Some(link.generation) {
            return Delivery::Stale { current };
        }

        match link.tx.send(msg).await {
            Ok(()) => Delivery::Queued,
            Err(_) => self.closed_outcome(link),
        }
    }

    /// Like [`deliver`](Self::deliver) but never waits for queue capacity
    pub fn try_deliver(&self, link: &ResultLink, msg: GatewayMessage) -> Delivery {
        let current = self.current_generation();
        if current != Some(link.generation) {
            return Delivery::Stale { current };
        }

        match link.tx.try_send(msg) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => self.closed_outcome(link),
        }
    }

    fn closed_outcome(&self, link: &ResultLink) -> Delivery {
        match self.current_generation() {
            Some(generation) if generation == link.generation => Delivery::Closed,
            current => Delivery::Stale { current },
        }
    }
}
