use std::fmt;
use tidal_types::{TestConfigMessage, TestType};

/// Lifecycle of a driver through one test run.
///
/// ```text
/// REGISTERED -> AWAITING_CONFIG -> CONFIGURED -> RUNNING -> DONE
///                     ^                                      |
///                     +------------ (rearm) -----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Registered,
    AwaitingConfig,
    Configured,
    Running,
    Done,
    /// No config arrived in time; the driver stays idle.
    Idle,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Registered => "REGISTERED",
            DriverState::AwaitingConfig => "AWAITING_CONFIG",
            DriverState::Configured => "CONFIGURED",
            DriverState::Running => "RUNNING",
            DriverState::Done => "DONE",
            DriverState::Idle => "IDLE",
        };
        f.write_str(name)
    }
}

/// Identity of a driver plus the parameters of its current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverNode {
    pub node_id: String,
    pub node_ip: String,
    pub test_id: String,
    pub test_type: Option<TestType>,
    pub test_server: String,
    pub message_count_per_driver: u64,
    pub test_message_delay: u64,
}

impl DriverNode {
    pub fn new(node_id: impl Into<String>, node_ip: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_ip: node_ip.into(),
            test_id: String::new(),
            test_type: None,
            test_server: String::new(),
            message_count_per_driver: 0,
            test_message_delay: 0,
        }
    }

    /// Copy the run parameters of an accepted config onto this node.
    pub fn apply_config(&mut self, config: &TestConfigMessage) {
        self.test_id = config.test_id.clone();
        self.test_type = Some(config.test_type);
        self.test_server = config.test_server.clone();
        self.message_count_per_driver = config.message_count_per_driver;
        self.test_message_delay = config.test_message_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_config_copies_run_parameters() {
        let mut node = DriverNode::new("n1", "10.0.0.1");
        let cfg = TestConfigMessage::new(TestType::Tsunami, "http://target/ping", 100, 5);
        node.apply_config(&cfg);

        assert_eq!(node.test_id, cfg.test_id);
        assert_eq!(node.test_type, Some(TestType::Tsunami));
        assert_eq!(node.test_server, "http://target/ping");
        assert_eq!(node.message_count_per_driver, 5);
        assert_eq!(node.test_message_delay, 100);
        assert_eq!(node.node_ip, "10.0.0.1");
    }
}
