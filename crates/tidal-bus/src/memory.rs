//! In-process backend built on tokio broadcast channels.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::bus::{BusMessage, MessageBus, Subscription};
use crate::error::{Error, Result};

const DEFAULT_CAPACITY: usize = 4096;

/// In-memory [`MessageBus`].
///
/// Every topic is a broadcast channel; each subscription is a receiver
/// created at subscribe time, so it only sees later messages. Publishing
/// to a topic nobody listens to drops the message.
pub struct MemoryBus {
    capacity: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    closed: bool,
    topics: HashMap<String, broadcast::Sender<BusMessage>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Per-topic buffer size. Slow subscribers lose the oldest messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State::default()),
        }
    }

    /// Shut the bus down. Open subscriptions drain what they have buffered
    /// and then report end of stream.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        state.topics.clear();
    }

    fn sender(&self, topic: &str) -> Result<broadcast::Sender<BusMessage>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(Error::Closed);
        }
        let capacity = self.capacity;
        Ok(state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone())
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()> {
        let sender = self.sender(topic)?;
        // No receivers: nobody is subscribed, the message is simply dropped.
        let _ = sender.send(BusMessage {
            topic: topic.to_string(),
            key: key.map(|k| k.as_bytes().to_vec()),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let receiver = self.sender(topic)?.subscribe();
        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            receiver,
        }))
    }
}

struct MemorySubscription {
    topic: String,
    receiver: broadcast::Receiver<BusMessage>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn recv(&mut self) -> Result<Option<BusMessage>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(Some(message)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber on '{}' lagged, {skipped} messages lost", self.topic);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
