//! Orchestrator of the tidal load-testing system.
//!
//! The orchestrator never talks to drivers directly; everything goes over
//! the bus and everything it learns is persisted in the state store.
//!
//! ```text
//! drivers ──register──▶ registration barrier ──quorum──▶ consumers + liveness sweep
//! drivers ──heartbeat / metrics / config-ack──▶ consumers ──▶ state store
//! POST /trigger-load-test ──▶ test-config ──▶ acks or settle delay ──▶ trigger ──▶ drivers
//! GET  /all-nodes, /metrics/:nodeid, ... ◀── state store + registry
//! ```
//!
//! Heartbeats, metrics and acknowledgements from nodes that never
//! registered are dropped. A node silent past the heartbeat timeout is
//! marked dead but kept, and comes back on its next heartbeat.

pub mod ack;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod quorum;
pub mod registry;

pub use ack::AckTracker;
pub use error::{Error, Result};
pub use orchestrator::{
    HandleOutcome, LoadTestRequest, Orchestrator, OrchestratorConfig, TriggerOutcome,
};
pub use quorum::{Quorum, QuorumPolicy};
pub use registry::{NodeStatus, NodeView, Registry, Touch};
