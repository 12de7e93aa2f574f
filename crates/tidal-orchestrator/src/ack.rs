//! Readiness acknowledgements collected between config and trigger.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Tracks which nodes have acknowledged the config of an in-flight run.
///
/// Only runs opened with [`AckTracker::open`] collect acknowledgements;
/// acks for any other `test_id` are dropped.
#[derive(Debug, Default)]
pub struct AckTracker {
    runs: Mutex<HashMap<String, HashSet<String>>>,
    changed: Notify,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start collecting acknowledgements for `test_id`.
    pub fn open(&self, test_id: &str) {
        self.runs().entry(test_id.to_string()).or_default();
    }

    /// Stop collecting for `test_id` and return who acknowledged it.
    pub fn close(&self, test_id: &str) -> HashSet<String> {
        self.runs().remove(test_id).unwrap_or_default()
    }

    /// Record an acknowledgement. Returns false if the run is not open.
    pub fn record(&self, test_id: &str, node_id: &str) -> bool {
        let recorded = match self.runs().get_mut(test_id) {
            Some(acked) => {
                acked.insert(node_id.to_string());
                true
            }
            None => false,
        };
        if recorded {
            self.changed.notify_waiters();
        } else {
            debug!("Dropping acknowledgement from {node_id} for inactive test {test_id}");
        }
        recorded
    }

    fn acked_all(&self, test_id: &str, expected: &[String]) -> bool {
        self.runs()
            .get(test_id)
            .is_some_and(|acked| expected.iter().all(|id| acked.contains(id)))
    }

    /// Wait until every node in `expected` acknowledged `test_id`, or until
    /// `limit` elapses. An empty `expected` set waits the full `limit`.
    ///
    /// Returns whether every expected node acknowledged in time.
    pub async fn wait_for(&self, test_id: &str, expected: &[String], limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        if expected.is_empty() {
            tokio::time::sleep_until(deadline).await;
            return false;
        }

        loop {
            let changed = self.changed.notified();
            if self.acked_all(test_id, expected) {
                return true;
            }
            tokio::select! {
                _ = changed => {}
                _ = tokio::time::sleep_until(deadline) => return self.acked_all(test_id, expected),
            }
        }
    }
}
