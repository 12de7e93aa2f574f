//! JSON codec binding each message record to its logical topic.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::message::{
    ConfigAckMessage, HeartbeatMessage, MetricsMessage, RegisterMessage, TestConfigMessage,
    TriggerMessage,
};
use crate::topics::Topic;

/// A record that travels on exactly one logical topic.
pub trait WireMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human readable kind, used in logs and errors.
    const KIND: &'static str;
    /// Topic the record is published to.
    const TOPIC: Topic;

    /// Partition key, if the record should stick to one partition.
    fn key(&self) -> Option<&str> {
        None
    }
}

impl WireMessage for RegisterMessage {
    const KIND: &'static str = "register";
    const TOPIC: Topic = Topic::Register;
}

impl WireMessage for TestConfigMessage {
    const KIND: &'static str = "test-config";
    const TOPIC: Topic = Topic::TestConfig;
}

impl WireMessage for TriggerMessage {
    const KIND: &'static str = "trigger";
    const TOPIC: Topic = Topic::Trigger;
}

impl WireMessage for MetricsMessage {
    const KIND: &'static str = "metrics";
    const TOPIC: Topic = Topic::Metrics;
}

impl WireMessage for HeartbeatMessage {
    const KIND: &'static str = "heartbeat";
    const TOPIC: Topic = Topic::Heartbeat;

    fn key(&self) -> Option<&str> {
        Some(&self.node_id)
    }
}

impl WireMessage for ConfigAckMessage {
    const KIND: &'static str = "config-ack";
    const TOPIC: Topic = Topic::ConfigAck;
}

/// Encode a record as a field-named JSON document.
pub fn encode<T: WireMessage>(message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|source| CodecError::Encode {
        kind: T::KIND,
        source,
    })
}

/// Decode a record previously produced by [`encode`].
pub fn decode<T: WireMessage>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|source| CodecError::Decode {
        kind: T::KIND,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MetricsData, TestType};

    fn roundtrip<T: WireMessage + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = encode(&value).unwrap();
        let back: T = decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_roundtrip_with_zero_and_empty_values() {
        roundtrip(RegisterMessage::new("", ""));
        roundtrip(TestConfigMessage {
            test_id: String::new(),
            test_type: TestType::Tsunami,
            test_server: String::new(),
            test_message_delay: 0,
            message_count_per_driver: 0,
        });
        roundtrip(TriggerMessage::new(""));
        roundtrip(HeartbeatMessage {
            node_id: String::new(),
            heartbeat: String::new(),
            timestamp: String::new(),
        });
        roundtrip(MetricsMessage {
            node_id: String::new(),
            test_id: String::new(),
            report_id: String::new(),
            metrics: MetricsData::default(),
        });
        roundtrip(ConfigAckMessage {
            node_id: String::new(),
            test_id: String::new(),
        });
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let trigger: TriggerMessage =
            decode(br#"{"test_id":"abc","trigger":"YES","issued_by":"ops"}"#).unwrap();
        assert_eq!(trigger.test_id, "abc");
    }

    #[test]
    fn test_decode_error_names_the_kind() {
        let err = decode::<HeartbeatMessage>(b"not json").unwrap_err();
        assert!(err.to_string().contains("heartbeat"));
    }

    #[test]
    fn test_heartbeat_is_keyed_by_node() {
        let hb = HeartbeatMessage::now("node-9");
        assert_eq!(hb.key(), Some("node-9"));
        assert_eq!(TriggerMessage::new("t").key(), None);
    }
}
