//! Wire protocol shared by the tidal orchestrator and its driver nodes.
//!
//! Every message travels over the bus as a field-named JSON record, one
//! record per bus message, so new fields can be added without breaking
//! older readers.
//!
//! # Topics
//!
//! ```text
//! Orchestrator ──test-config──▶ Drivers ──register──▶ Orchestrator
//! Orchestrator ──trigger──────▶ Drivers ──metrics───▶ Orchestrator
//!                               Drivers ──heartbeat─▶ Orchestrator
//!                               Drivers ──config-ack▶ Orchestrator
//! ```
//!
//! The `test_id` generated by the orchestrator for each run is the only
//! correlation key between a test configuration and its trigger.

pub mod codec;
pub mod error;
pub mod message;
pub mod topics;

pub use codec::{decode, encode, WireMessage};
pub use error::{CodecError, Result};
pub use message::{
    ConfigAckMessage, HeartbeatMessage, MessageType, MetricsData, MetricsMessage,
    RegisterMessage, TestConfigMessage, TestType, TriggerMessage, HEARTBEAT_YES, TRIGGER_YES,
};
pub use topics::{Topic, TopicNames};

use std::time::Duration;

/// Interval between two heartbeats of a running driver.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Interval between two intermediate metrics reports of a running driver.
pub const METRICS_INTERVAL: Duration = Duration::from_millis(10);

/// Longest time the orchestrator waits between publishing a test config and
/// publishing its trigger.
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Longest time a driver waits for a test config before giving up.
pub const CONFIG_WAIT: Duration = Duration::from_secs(60);
