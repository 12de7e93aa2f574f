//! Driver node of the tidal load-testing system.
//!
//! A driver registers with the orchestrator, waits for a test config,
//! waits for the trigger carrying the same `test_id`, then hammers the
//! target server while streaming latency metrics and heartbeats.
//!
//! ```text
//!            register            test-config            trigger(test_id)
//! REGISTERED ────────▶ AWAITING_CONFIG ────▶ CONFIGURED ─────────▶ RUNNING
//!                            ▲                  │ config-ack          │
//!                            │                  ▼                     │ load done
//!                            └──── rearm ──── DONE ◀──────────────────┘
//! ```
//!
//! While RUNNING three tasks share one "done" token:
//!
//! - the load algorithm ([`LoadGenerator::avalanche`] or [`LoadGenerator::tsunami`])
//! - the streaming metrics producer ([`reporting::stream_metrics`])
//! - the heartbeat producer ([`reporting::send_heartbeats`])
//!
//! When the load algorithm returns the token fires, both producers stop and
//! one final metrics report is published.

pub mod driver;
pub mod error;
pub mod load;
pub mod metrics;
pub mod node;
pub mod reporting;

pub use driver::{AcquisitionOutcome, Driver, DriverConfig, RunReport};
pub use error::{Error, Result};
pub use load::{LoadGenerator, LoadStats};
pub use metrics::{format_duration, summarize, LatencySummary, MetricsAggregator};
pub use node::{DriverNode, DriverState};
