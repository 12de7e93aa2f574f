//! Logical topics and their configurable bus names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical topic of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Register,
    TestConfig,
    Trigger,
    Metrics,
    Heartbeat,
    ConfigAck,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Register,
        Topic::TestConfig,
        Topic::Trigger,
        Topic::Metrics,
        Topic::Heartbeat,
        Topic::ConfigAck,
    ];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::Register => "register",
            Topic::TestConfig => "test-config",
            Topic::Trigger => "trigger",
            Topic::Metrics => "metrics",
            Topic::Heartbeat => "heartbeat",
            Topic::ConfigAck => "config-ack",
        };
        f.write_str(name)
    }
}

/// Bus topic names used by one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNames {
    pub register: String,
    pub test_config: String,
    pub trigger: String,
    pub metrics: String,
    pub heartbeat: String,
    pub config_ack: String,
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            register: "register-topic".to_string(),
            test_config: "test-config-topic".to_string(),
            trigger: "trigger-topic".to_string(),
            metrics: "metrics-topic".to_string(),
            heartbeat: "heartbeat".to_string(),
            config_ack: "config-ack-topic".to_string(),
        }
    }
}

impl TopicNames {
    /// Bus name of a logical topic.
    pub fn name(&self, topic: Topic) -> &str {
        match topic {
            Topic::Register => &self.register,
            Topic::TestConfig => &self.test_config,
            Topic::Trigger => &self.trigger,
            Topic::Metrics => &self.metrics,
            Topic::Heartbeat => &self.heartbeat,
            Topic::ConfigAck => &self.config_ack,
        }
    }

    /// Every configured bus name, in protocol order.
    pub fn all(&self) -> Vec<&str> {
        Topic::ALL.iter().map(|t| self.name(*t)).collect()
    }
}
