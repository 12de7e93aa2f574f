//! Key/value store abstraction.

use async_trait::async_trait;

use crate::error::Result;

/// Read-modify-write step run atomically by [`StateStore::update`].
///
/// Receives the current value (if any) and returns the value to store.
/// Returning an error aborts the update and leaves the key untouched.
pub type UpdateFn = Box<dyn FnOnce(Option<Vec<u8>>) -> Result<Vec<u8>> + Send>;

/// Durable byte-oriented key/value store.
///
/// Implementations:
/// - Embedded redb database (`RedbStore`)
/// - Process-local map (`MemoryStore`)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns None if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Every entry whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Atomically replace the value under `key` with the result of `f`.
    async fn update(&self, key: &str, f: UpdateFn) -> Result<()>;
}
