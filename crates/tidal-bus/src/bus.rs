//! Byte-level bus abstraction shared by all backends.

use async_trait::async_trait;

use crate::error::Result;

/// A message as delivered by the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Publish/subscribe operations the protocol needs from a broker.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Enqueue one payload on `topic`.
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()>;

    /// Open a subscription that sees every message published to `topic`
    /// after this call returns.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;
}

/// An open subscription to one topic.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the bus has shut down; no further messages
    /// will arrive after that.
    async fn recv(&mut self) -> Result<Option<BusMessage>>;
}
