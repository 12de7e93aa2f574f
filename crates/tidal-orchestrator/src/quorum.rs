//! Registration quorum accounting.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// When the registration barrier counts as satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuorumPolicy {
    /// Release on the N-th registration event; a node registering twice
    /// counts twice.
    #[default]
    CountEvents,
    /// Release once N distinct node ids have registered.
    DistinctNodes,
}

impl fmt::Display for QuorumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumPolicy::CountEvents => f.write_str("count-events"),
            QuorumPolicy::DistinctNodes => f.write_str("distinct-nodes"),
        }
    }
}

impl FromStr for QuorumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count-events" => Ok(QuorumPolicy::CountEvents),
            "distinct-nodes" => Ok(QuorumPolicy::DistinctNodes),
            other => Err(format!(
                "Unknown quorum policy '{other}' (expected count-events or distinct-nodes)"
            )),
        }
    }
}

/// Progress towards the registration quorum.
#[derive(Debug)]
pub struct Quorum {
    policy: QuorumPolicy,
    required: usize,
    events: usize,
    distinct: HashSet<String>,
}

impl Quorum {
    pub fn new(policy: QuorumPolicy, required: usize) -> Self {
        Self {
            policy,
            required,
            events: 0,
            distinct: HashSet::new(),
        }
    }

    /// Count one registration of `node_id`.
    pub fn observe(&mut self, node_id: &str) {
        self.events += 1;
        self.distinct.insert(node_id.to_string());
    }

    /// Registrations counted so far under the active policy.
    pub fn progress(&self) -> usize {
        match self.policy {
            QuorumPolicy::CountEvents => self.events,
            QuorumPolicy::DistinctNodes => self.distinct.len(),
        }
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn is_reached(&self) -> bool {
        self.progress() >= self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_events_counts_duplicates() {
        let mut quorum = Quorum::new(QuorumPolicy::CountEvents, 2);
        quorum.observe("a");
        assert!(!quorum.is_reached());
        quorum.observe("a");
        assert!(quorum.is_reached());
    }

    #[test]
    fn test_distinct_nodes_ignores_duplicates() {
        let mut quorum = Quorum::new(QuorumPolicy::DistinctNodes, 2);
        quorum.observe("a");
        quorum.observe("a");
        assert!(!quorum.is_reached());
        assert_eq!(quorum.progress(), 1);
        quorum.observe("b");
        assert!(quorum.is_reached());
    }

    #[test]
    fn test_zero_quorum_is_reached_immediately() {
        assert!(Quorum::new(QuorumPolicy::CountEvents, 0).is_reached());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("distinct-nodes".parse::<QuorumPolicy>().unwrap(), QuorumPolicy::DistinctNodes);
        assert_eq!(QuorumPolicy::default().to_string(), "count-events");
        assert!("majority".parse::<QuorumPolicy>().is_err());
    }
}
