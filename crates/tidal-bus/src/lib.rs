//! Message bus client for the tidal protocol.
//!
//! The bus is byte oriented: [`MessageBus`] publishes and subscribes raw
//! payloads per topic. [`Bus`] layers the typed protocol on top of it,
//! encoding and decoding [`tidal_types::WireMessage`] records and resolving
//! logical topics to their configured names.
//!
//! Two backends are provided:
//!
//! - [`KafkaBus`] - rdkafka producer plus one consumer per subscription, assigned at the high watermarks
//! - [`MemoryBus`] - tokio broadcast channels, for tests and single-process runs
//!
//! Delivery is at-least-once with ordering only within a topic partition.
//! Subscriptions start at the newest message: anything published before
//! `subscribe` returns is not seen by that subscription.

pub mod bus;
pub mod error;
pub mod kafka;
pub mod memory;
pub mod typed;

pub use bus::{BusMessage, MessageBus, Subscription};
pub use error::{Error, Result};
pub use kafka::{KafkaBus, KafkaConfig};
pub use memory::MemoryBus;
pub use typed::{Bus, PublishReport, TypedSubscription};
