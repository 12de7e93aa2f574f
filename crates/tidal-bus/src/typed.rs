//! Typed protocol layer over a [`MessageBus`].

use std::marker::PhantomData;
use std::sync::Arc;
use tidal_types::{decode, encode, TopicNames, WireMessage};
use tracing::{debug, warn};

use crate::bus::{MessageBus, Subscription};
use crate::error::Result;

/// Outcome of a batch publish.
///
/// Publishing never aborts half way: every record is attempted and the
/// failures are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub enqueued: usize,
    pub errors: usize,
}

impl PublishReport {
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Cloneable handle that publishes and subscribes protocol records.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<dyn MessageBus>,
    topics: Arc<TopicNames>,
}

impl Bus {
    pub fn new(inner: Arc<dyn MessageBus>, topics: TopicNames) -> Self {
        Self {
            inner,
            topics: Arc::new(topics),
        }
    }

    pub fn topics(&self) -> &TopicNames {
        &self.topics
    }

    /// Encode and publish every record in `messages`.
    pub async fn publish<T: WireMessage>(&self, messages: &[T]) -> PublishReport {
        let topic = self.topics.name(T::TOPIC);
        let mut report = PublishReport::default();

        for message in messages {
            let payload = match encode(message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode {} message: {e}", T::KIND);
                    report.errors += 1;
                    continue;
                }
            };

            match self.inner.publish(topic, message.key(), &payload).await {
                Ok(()) => report.enqueued += 1,
                Err(e) => {
                    warn!("Failed to publish {} message to '{topic}': {e}", T::KIND);
                    report.errors += 1;
                }
            }
        }

        debug!(
            "Published {} {} message(s) to '{topic}' ({} errors)",
            report.enqueued,
            T::KIND,
            report.errors
        );
        report
    }

    /// Publish a single record.
    pub async fn publish_one<T: WireMessage>(&self, message: &T) -> PublishReport {
        self.publish(std::slice::from_ref(message)).await
    }

    /// Subscribe to the topic carrying `T`, starting at the newest message.
    pub async fn subscribe<T: WireMessage>(&self) -> Result<TypedSubscription<T>> {
        let topic = self.topics.name(T::TOPIC);
        let inner = self.inner.subscribe(topic).await?;
        Ok(TypedSubscription {
            inner,
            _marker: PhantomData,
        })
    }
}

/// Subscription that decodes each message into `T`.
pub struct TypedSubscription<T> {
    inner: Box<dyn Subscription>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireMessage> TypedSubscription<T> {
    /// Next record on the topic.
    ///
    /// `None` means the bus shut down. A payload that fails to decode is
    /// returned as `Some(Err(_))` so the caller can log and skip it.
    pub async fn next(&mut self) -> Option<Result<T>> {
        match self.inner.recv().await {
            Ok(Some(message)) => Some(decode(&message.payload).map_err(Into::into)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
