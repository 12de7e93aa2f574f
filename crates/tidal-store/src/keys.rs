//! Layout of the orchestrator's persisted state.

/// JSON array of every accepted registration, in arrival order.
pub const REGISTER: &str = "register";

/// JSON array holding the test config of the most recent run.
pub const TEST_CONFIGS: &str = "testConfigMessages";

pub const METRICS_PREFIX: &str = "metrics:";
pub const HEARTBEAT_PREFIX: &str = "heartbeat:";

/// Latest metrics report of `node_id`.
pub fn metrics(node_id: &str) -> String {
    format!("{METRICS_PREFIX}{node_id}")
}

/// Append-only heartbeat history of `node_id`.
pub fn heartbeat(node_id: &str) -> String {
    format!("{HEARTBEAT_PREFIX}{node_id}")
}
