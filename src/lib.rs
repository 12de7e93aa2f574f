//! tidal
//!
//! Distributed HTTP load testing. An orchestrator waits for a quorum of
//! driver registrations, hands every driver the same test configuration and
//! then releases them together with a trigger; drivers hammer the target
//! and stream latency metrics and heartbeats back. All coordination goes
//! over a publish/subscribe bus.
//!
//! # Crates
//!
//! - `tidal_types` - wire messages, topic names, JSON codec
//! - `tidal_bus` - Kafka and in-memory message bus
//! - `tidal_store` - redb-backed state store
//! - `tidal_driver` - driver state machine and load algorithms
//! - `tidal_orchestrator` - registration barrier, consumers, HTTP surface
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the six protocol topics
//! tidal create-topics --brokers localhost:9092
//!
//! # Orchestrator waiting for three drivers
//! tidal orchestrator --drivers 3 --listen 0.0.0.0:8081 --data-dir ./data
//!
//! # One driver per host
//! tidal driver --node-ip 10.0.0.12
//!
//! # Something to point the drivers at
//! tidal target --listen 0.0.0.0:8080 --delay 1s
//! ```

pub mod config;
pub mod target;

pub use config::{parse_duration, BusArgs, BusKind, TopicArgs};
