//! Command-line configuration shared by every subcommand.

mod duration;

pub use duration::parse_duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use std::sync::Arc;
use tidal_bus::{Bus, KafkaBus, KafkaConfig, MemoryBus, MessageBus};
use tidal_types::TopicNames;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    /// Kafka brokers
    Kafka,
    /// In-process channels (single-process demos only)
    Memory,
}

/// Message bus connection options
#[derive(Args, Clone, Debug)]
pub struct BusArgs {
    /// Kafka brokers (comma-separated list)
    #[arg(long, env = "TIDAL_BROKERS", default_value = "localhost:9092")]
    pub brokers: String,

    /// Bus backend
    #[arg(long = "bus", value_enum, default_value_t = BusKind::Kafka)]
    pub kind: BusKind,

    /// Prefix of the per-subscription consumer groups
    #[arg(long, env = "TIDAL_GROUP_PREFIX", default_value = "tidal")]
    pub group_prefix: String,
}

impl BusArgs {
    pub fn kafka_config(&self) -> KafkaConfig {
        KafkaConfig {
            brokers: self.brokers.clone(),
            group_prefix: self.group_prefix.clone(),
            ..Default::default()
        }
    }

    /// Build the configured backend and wrap it in a typed [`Bus`].
    pub fn connect(&self, topics: TopicNames) -> anyhow::Result<Bus> {
        let inner: Arc<dyn MessageBus> = match self.kind {
            BusKind::Kafka => Arc::new(
                KafkaBus::new(self.kafka_config())
                    .with_context(|| format!("Failed to connect to Kafka at {}", self.brokers))?,
            ),
            BusKind::Memory => Arc::new(MemoryBus::new()),
        };
        Ok(Bus::new(inner, topics))
    }
}

/// Bus topic names
#[derive(Args, Clone, Debug)]
pub struct TopicArgs {
    #[arg(long, env = "TIDAL_REGISTER_TOPIC", default_value = "register-topic")]
    pub register_topic: String,

    #[arg(long, env = "TIDAL_TEST_CONFIG_TOPIC", default_value = "test-config-topic")]
    pub test_config_topic: String,

    #[arg(long, env = "TIDAL_TRIGGER_TOPIC", default_value = "trigger-topic")]
    pub trigger_topic: String,

    #[arg(long, env = "TIDAL_METRICS_TOPIC", default_value = "metrics-topic")]
    pub metrics_topic: String,

    #[arg(long, env = "TIDAL_HEARTBEAT_TOPIC", default_value = "heartbeat")]
    pub heartbeat_topic: String,

    #[arg(long, env = "TIDAL_CONFIG_ACK_TOPIC", default_value = "config-ack-topic")]
    pub config_ack_topic: String,
}

impl From<&TopicArgs> for TopicNames {
    fn from(args: &TopicArgs) -> Self {
        Self {
            register: args.register_topic.clone(),
            test_config: args.test_config_topic.clone(),
            trigger: args.trigger_topic.clone(),
            metrics: args.metrics_topic.clone(),
            heartbeat: args.heartbeat_topic.clone(),
            config_ack: args.config_ack_topic.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        bus: BusArgs,
        #[command(flatten)]
        topics: TopicArgs,
    }

    #[test]
    fn test_topic_defaults_match_protocol_names() {
        let cli = TestCli::parse_from(["tidal"]);
        assert_eq!(TopicNames::from(&cli.topics), TopicNames::default());
    }

    #[test]
    fn test_bus_args() {
        let cli = TestCli::parse_from([
            "tidal",
            "--bus",
            "memory",
            "--brokers",
            "k1:9092,k2:9092",
            "--trigger-topic",
            "go",
        ]);
        assert_eq!(cli.bus.kind, BusKind::Memory);
        assert_eq!(cli.bus.kafka_config().brokers, "k1:9092,k2:9092");
        assert_eq!(TopicNames::from(&cli.topics).trigger, "go");

        let bus = cli.bus.connect(TopicNames::from(&cli.topics)).unwrap();
        assert_eq!(bus.topics().trigger, "go");
    }
}
