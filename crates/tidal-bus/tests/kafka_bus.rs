//! Kafka backend against a live broker.
//!
//! Run with `cargo test -p tidal-bus --test kafka_bus -- --ignored` and a
//! broker at `TIDAL_BROKERS` (default `localhost:9092`).

use std::sync::Arc;
use std::time::Duration;

use tidal_bus::{Bus, KafkaBus, KafkaConfig};
use tidal_types::{TopicNames, TriggerMessage};
use uuid::Uuid;

fn kafka_config() -> KafkaConfig {
    KafkaConfig {
        brokers: std::env::var("TIDAL_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_message_published_right_after_subscribe_is_delivered() {
    let kafka = KafkaBus::new(kafka_config()).unwrap();
    let topics = TopicNames {
        trigger: format!("tidal-test-trigger-{}", Uuid::new_v4()),
        ..Default::default()
    };
    kafka.create_topics(&[topics.trigger.as_str()], 3).await.unwrap();
    let bus = Bus::new(Arc::new(kafka), topics);

    // Older traffic must not be replayed
    bus.publish_one(&TriggerMessage::new("before")).await;

    let mut sub = bus.subscribe::<TriggerMessage>().await.unwrap();
    let report = bus.publish_one(&TriggerMessage::new("after")).await;
    assert!(report.is_ok());

    let trigger = tokio::time::timeout(Duration::from_secs(30), sub.next())
        .await
        .expect("trigger published after subscribe never arrived")
        .unwrap()
        .unwrap();
    assert_eq!(trigger.test_id, "after");
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_subscribe_to_missing_topic_fails() {
    let kafka = KafkaBus::new(KafkaConfig {
        metadata_timeout: Duration::from_secs(3),
        ..kafka_config()
    })
    .unwrap();
    let bus = Bus::new(
        Arc::new(kafka),
        TopicNames {
            trigger: format!("tidal-missing-{}", Uuid::new_v4()),
            ..Default::default()
        },
    );
    assert!(bus.subscribe::<TriggerMessage>().await.is_err());
}
