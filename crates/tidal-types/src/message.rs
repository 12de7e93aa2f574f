//! Message records exchanged between the orchestrator and the drivers.
//!
//! All records are immutable values. Unknown fields are ignored on decode and
//! optional additions carry `#[serde(default)]`, so a newer peer can add
//! fields without breaking an older one.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CodecError;

/// Value carried by every trigger message.
pub const TRIGGER_YES: &str = "YES";

/// Value carried by every heartbeat message.
pub const HEARTBEAT_YES: &str = "YES";

/// Kind of registration announced by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    DriverNodeRegister,
}

/// Load pattern a driver applies to the target server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    /// Every request of the run is in flight at once.
    Avalanche,
    /// One request per tick, strictly sequential.
    Tsunami,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Avalanche => "AVALANCHE",
            TestType::Tsunami => "TSUNAMI",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVALANCHE" => Ok(TestType::Avalanche),
            "TSUNAMI" => Ok(TestType::Tsunami),
            _ => Err(CodecError::UnknownTestType(s.to_string())),
        }
    }
}

/// Announces a driver to the orchestrator. Sent once per driver process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMessage {
    pub node_id: String,
    #[serde(rename = "node_IP", alias = "node_ip")]
    pub node_ip: String,
    pub message_type: MessageType,
}

impl RegisterMessage {
    pub fn new(node_id: impl Into<String>, node_ip: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_ip: node_ip.into(),
            message_type: MessageType::DriverNodeRegister,
        }
    }
}

/// Parameters of one test run, published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfigMessage {
    pub test_id: String,
    pub test_type: TestType,
    /// URL every driver sends its GET requests to.
    #[serde(default)]
    pub test_server: String,
    /// Pacing period in milliseconds (TSUNAMI only).
    pub test_message_delay: u64,
    pub message_count_per_driver: u64,
}

impl TestConfigMessage {
    /// Build a config for a new run with a freshly generated `test_id`.
    pub fn new(
        test_type: TestType,
        test_server: impl Into<String>,
        test_message_delay: u64,
        message_count_per_driver: u64,
    ) -> Self {
        Self {
            test_id: Uuid::new_v4().to_string(),
            test_type,
            test_server: test_server.into(),
            test_message_delay,
            message_count_per_driver,
        }
    }
}

/// Go signal for the run identified by `test_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    pub test_id: String,
    pub trigger: String,
}

impl TriggerMessage {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            trigger: TRIGGER_YES.to_string(),
        }
    }
}

/// Liveness signal emitted by a driver while a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub node_id: String,
    pub heartbeat: String,
    /// RFC 3339 wall-clock time at which the heartbeat was produced.
    pub timestamp: String,
}

impl HeartbeatMessage {
    /// Heartbeat stamped with the current UTC time.
    pub fn now(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            heartbeat: HEARTBEAT_YES.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Latency summary of a driver's samples, formatted as duration strings.
///
/// All fields are empty when no sample has been recorded yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsData {
    pub mean_latency: String,
    pub median_latency: String,
    pub min_latency: String,
    pub max_latency: String,
}

impl MetricsData {
    pub fn is_empty(&self) -> bool {
        self.mean_latency.is_empty()
            && self.median_latency.is_empty()
            && self.min_latency.is_empty()
            && self.max_latency.is_empty()
    }
}

/// One metrics report. Every report carries a fresh `report_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsMessage {
    pub node_id: String,
    pub test_id: String,
    pub report_id: String,
    pub metrics: MetricsData,
}

impl MetricsMessage {
    pub fn new(
        node_id: impl Into<String>,
        test_id: impl Into<String>,
        metrics: MetricsData,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            test_id: test_id.into(),
            report_id: Uuid::new_v4().to_string(),
            metrics,
        }
    }
}

/// Sent by a driver once it has accepted the config for `test_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAckMessage {
    pub node_id: String,
    pub test_id: String,
}
