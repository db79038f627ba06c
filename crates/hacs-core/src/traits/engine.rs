//! Local engine trait

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RelayError;

/// The on-device process that interprets and executes intents.
///
/// The agent only forwards intent text and relays whatever JSON comes back;
/// what the engine does with the text is opaque to it.
#[async_trait]
pub trait IntentEngine: Send + Sync {
    /// Submit one intent and return the engine's raw JSON result
    async fn act(&self, text: &str) -> Result<serde_json::Value, RelayError>;
}

#[async_trait]
impl<E: IntentEngine + ?Sized> IntentEngine for Arc<E> {
    async fn act(&self, text: &str) -> Result<serde_json::Value, RelayError> {
        (**self).act(text).await
    }
}
