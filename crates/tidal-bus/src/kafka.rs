//! Kafka backend built on rdkafka.

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::message::Message as RdkafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::{BusMessage, MessageBus, Subscription};
use crate::error::{Error, Result};

/// Configuration for the Kafka backend
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Prefix of the consumer group id given to every subscription
    ///
    /// Subscriptions never join the group: partitions are assigned directly
    /// at their high watermark, so every subscriber sees every message of the
    /// topic published after `subscribe` returns.
    pub group_prefix: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// How long the producer may queue a message before reporting failure
    pub message_timeout_ms: String,
    /// How long `publish` waits for queue space
    pub queue_timeout: Duration,
    /// How long `subscribe` waits for topic metadata and watermarks
    pub metadata_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_prefix: "tidal".to_string(),
            session_timeout_ms: "6000".to_string(),
            message_timeout_ms: "5000".to_string(),
            queue_timeout: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(10),
        }
    }
}

/// Kafka-backed [`MessageBus`].
pub struct KafkaBus {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaBus {
    /// Connect a producer to the configured brokers.
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", &config.message_timeout_ms)
            .create()
            .map_err(|e| Error::Producer(format!("Failed to create producer: {e}")))?;

        Ok(Self { producer, config })
    }

    /// Create the given topics, treating "already exists" as success.
    pub async fn create_topics(&self, topics: &[&str], partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .create()
            .map_err(|e| Error::TopicCreation(format!("Failed to create admin client: {e}")))?;

        let new_topics: Vec<NewTopic> = topics
            .iter()
            .map(|topic| NewTopic::new(topic, partitions, TopicReplication::Fixed(1)))
            .collect();
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

        let results = admin_client
            .create_topics(&new_topics, &opts)
            .await
            .map_err(|e| Error::TopicCreation(format!("Failed to create topics: {e}")))?;

        for result in results {
            match result {
                Ok(topic_name) => info!("Topic '{topic_name}' created successfully"),
                Err((topic_name, err)) => {
                    if err.to_string().contains("already exists") {
                        info!("Topic '{topic_name}' already exists");
                    } else {
                        return Err(Error::TopicCreation(format!(
                            "Failed to create topic '{topic_name}': {err}"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()> {
        let record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic).payload(payload);
        let record = match key {
            Some(key) => record.key(key),
            None => record,
        };

        self.producer
            .send(record, self.config.queue_timeout)
            .await
            .map_err(|(err, _)| err)?;

        debug!("Published {} bytes to '{topic}'", payload.len());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let config = self.config.clone();
        let topic = topic.to_string();
        // Metadata and watermark lookups block on the broker
        let consumer = tokio::task::spawn_blocking(move || assigned_consumer(&config, &topic))
            .await
            .map_err(|e| Error::Consumer(format!("Subscription task failed: {e}")))??;
        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

/// Build a consumer already positioned at the end of every partition of
/// `topic`, so the start offset is fixed before the caller publishes anything.
fn assigned_consumer(config: &KafkaConfig, topic: &str) -> Result<StreamConsumer> {
    let group_id = format!("{}-{}", config.group_prefix, Uuid::new_v4());
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", &config.session_timeout_ms)
        .set("enable.partition.eof", "false")
        .create()
        .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

    let metadata = consumer
        .fetch_metadata(Some(topic), config.metadata_timeout)
        .map_err(|e| Error::Consumer(format!("Failed to fetch metadata for '{topic}': {e}")))?;
    let partitions: Vec<i32> = metadata
        .topics()
        .iter()
        .filter(|t| t.name() == topic && t.error().is_none())
        .flat_map(|t| t.partitions().iter().map(|p| p.id()))
        .collect();
    if partitions.is_empty() {
        return Err(Error::Consumer(format!(
            "Topic '{topic}' has no partitions (run `tidal create-topics` first)"
        )));
    }

    let mut positions = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let (_, high) = consumer
            .fetch_watermarks(topic, partition, config.metadata_timeout)
            .map_err(|e| {
                Error::Consumer(format!(
                    "Failed to fetch watermarks for '{topic}' partition {partition}: {e}"
                ))
            })?;
        positions.push((partition, high));
    }

    consumer
        .assign(&start_positions(topic, &positions)?)
        .map_err(|e| Error::Consumer(format!("Failed to assign partitions of '{topic}': {e}")))?;

    debug!("Subscribed to '{topic}' at {positions:?} as {group_id}");
    Ok(consumer)
}

/// Assignment starting each `(partition, high_watermark)` at its watermark.
fn start_positions(topic: &str, positions: &[(i32, i64)]) -> Result<TopicPartitionList> {
    let mut tpl = TopicPartitionList::new();
    for &(partition, high) in positions {
        tpl.add_partition_offset(topic, partition, Offset::Offset(high))
            .map_err(|e| Error::Consumer(format!("Failed to add partition offset: {e}")))?;
    }
    Ok(tpl)
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn recv(&mut self) -> Result<Option<BusMessage>> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| Error::Consumer(format!("Error receiving message: {e}")))?;

        let payload = msg
            .payload()
            .ok_or_else(|| Error::Consumer("Message has no payload".to_string()))?;

        Ok(Some(BusMessage {
            topic: msg.topic().to_string(),
            key: msg.key().map(|k| k.to_vec()),
            payload: payload.to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_positions_pin_each_partition_to_its_watermark() {
        let tpl = start_positions("trigger-topic", &[(0, 42), (1, 0), (2, 7)]).unwrap();
        assert_eq!(tpl.count(), 3);
        let offsets: Vec<(i32, Offset)> = tpl
            .elements_for_topic("trigger-topic")
            .iter()
            .map(|e| (e.partition(), e.offset()))
            .collect();
        assert_eq!(
            offsets,
            vec![
                (0, Offset::Offset(42)),
                (1, Offset::Offset(0)),
                (2, Offset::Offset(7))
            ]
        );
    }

    #[test]
    fn test_start_positions_of_empty_topic() {
        let tpl = start_positions("t", &[]).unwrap();
        assert_eq!(tpl.count(), 0);
    }
}
