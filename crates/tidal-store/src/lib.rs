//! Persistent state of the tidal orchestrator.
//!
//! A small key/value abstraction ([`StateStore`]) with two backends:
//!
//! - [`RedbStore`] - embedded redb database, survives restarts
//! - [`MemoryStore`] - in-process map, for tests
//!
//! Values are JSON documents; see [`keys`] for the layout and
//! [`get_json`], [`set_json`] and [`append_json`] for typed access.

pub mod error;
pub mod json;
pub mod keys;
pub mod memory;
pub mod redb_store;
pub mod store;

pub use error::{Error, Result};
pub use json::{append_json, get_json, set_json};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::{StateStore, UpdateFn};
