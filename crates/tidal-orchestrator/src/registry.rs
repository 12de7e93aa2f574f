//! In-memory registry of driver nodes and their liveness.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Liveness of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Alive,
    /// Silent for longer than the heartbeat timeout. The node stays
    /// registered and returns to `Alive` on its next heartbeat.
    Dead,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Alive => f.write_str("ALIVE"),
            NodeStatus::Dead => f.write_str("DEAD"),
        }
    }
}

#[derive(Debug, Clone)]
struct NodeEntry {
    node_ip: String,
    status: NodeStatus,
    last_seen: Instant,
    last_seen_at: DateTime<Utc>,
    registrations: u32,
}

/// Point-in-time view of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub node_id: String,
    pub node_ip: String,
    pub status: NodeStatus,
    /// RFC 3339 wall-clock time of the last registration or heartbeat.
    pub last_seen: String,
    pub registrations: u32,
}

/// Result of recording a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    Unknown,
    Refreshed,
    /// The node was `Dead` and is `Alive` again.
    Revived,
}

/// Registry of `node_id -> last_seen`.
///
/// The lock guards the map mutation only; callers do their store and bus
/// I/O after the call returns.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: Mutex<HashMap<String, NodeEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, HashMap<String, NodeEntry>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or re-insert a node as `Alive`, seen now.
    pub fn register(&self, node_id: &str, node_ip: &str) {
        let now = Instant::now();
        let mut nodes = self.nodes();
        let entry = nodes.entry(node_id.to_string()).or_insert_with(|| NodeEntry {
            node_ip: node_ip.to_string(),
            status: NodeStatus::Alive,
            last_seen: now,
            last_seen_at: Utc::now(),
            registrations: 0,
        });
        entry.node_ip = node_ip.to_string();
        entry.status = NodeStatus::Alive;
        entry.last_seen = now;
        entry.last_seen_at = Utc::now();
        entry.registrations += 1;
    }

    /// Refresh `last_seen` of a registered node.
    pub fn touch(&self, node_id: &str) -> Touch {
        let mut nodes = self.nodes();
        let Some(entry) = nodes.get_mut(node_id) else {
            return Touch::Unknown;
        };
        entry.last_seen = Instant::now();
        entry.last_seen_at = Utc::now();
        match entry.status {
            NodeStatus::Alive => Touch::Refreshed,
            NodeStatus::Dead => {
                entry.status = NodeStatus::Alive;
                Touch::Revived
            }
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes().contains_key(node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes().get(node_id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    /// Ids of every registered node, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of every node currently `Alive`, sorted.
    pub fn alive_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes()
            .iter()
            .filter(|(_, e)| e.status == NodeStatus::Alive)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Mark `Dead` every `Alive` node not seen within `timeout` of `now`.
    ///
    /// Returns the ids that changed state, sorted.
    pub fn sweep_at(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut expired: Vec<String> = self
            .nodes()
            .iter_mut()
            .filter(|(_, e)| {
                e.status == NodeStatus::Alive && now.saturating_duration_since(e.last_seen) > timeout
            })
            .map(|(id, e)| {
                e.status = NodeStatus::Dead;
                id.clone()
            })
            .collect();
        expired.sort();
        expired
    }

    pub fn snapshot(&self) -> Vec<NodeView> {
        let mut views: Vec<NodeView> = self
            .nodes()
            .iter()
            .map(|(id, e)| NodeView {
                node_id: id.clone(),
                node_ip: e.node_ip.clone(),
                status: e.status,
                last_seen: e.last_seen_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                registrations: e.registrations,
            })
            .collect();
        views.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_marks_silent_nodes_dead() {
        let registry = Registry::new();
        registry.register("a", "10.0.0.1");
        registry.register("b", "10.0.0.2");

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(registry.touch("b"), Touch::Refreshed);
        tokio::time::advance(Duration::from_secs(30)).await;

        let expired = registry.sweep_at(Instant::now(), Duration::from_secs(60));
        assert_eq!(expired, vec!["a".to_string()]);
        assert_eq!(registry.status("a"), Some(NodeStatus::Dead));
        assert_eq!(registry.status("b"), Some(NodeStatus::Alive));
        assert!(registry.contains("a"));
        assert_eq!(registry.alive_ids(), vec!["b".to_string()]);

        // Already dead nodes are not reported again
        assert!(registry.sweep_at(Instant::now(), Duration::from_secs(60)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_revives_dead_node() {
        let registry = Registry::new();
        registry.register("a", "10.0.0.1");
        tokio::time::advance(Duration::from_secs(10)).await;
        registry.sweep_at(Instant::now(), Duration::from_secs(5));

        assert_eq!(registry.touch("a"), Touch::Revived);
        assert_eq!(registry.status("a"), Some(NodeStatus::Alive));
    }

    #[test]
    fn test_touch_unknown_node() {
        let registry = Registry::new();
        assert_eq!(registry.touch("ghost"), Touch::Unknown);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_one_entry() {
        let registry = Registry::new();
        registry.register("a", "10.0.0.1");
        registry.register("a", "10.0.0.9");

        assert_eq!(registry.len(), 1);
        let view = &registry.snapshot()[0];
        assert_eq!(view.node_ip, "10.0.0.9");
        assert_eq!(view.registrations, 2);
        assert_eq!(view.status, NodeStatus::Alive);
    }
}
