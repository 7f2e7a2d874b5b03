//! Node identity.
//!
//! Each running instance gets one identifier for its process lifetime. The
//! identity names the node's inbound relay channel and is never persisted:
//! a restart yields a fresh identity, and envelopes addressed to the old
//! one are silently undeliverable.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a generated node identifier.
pub const NODE_ID_LEN: usize = 16;

/// Unique identifier for a running node.
///
/// The composition root generates one at startup and hands it to the
/// gateway and relay constructors; there is no process-global instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a random node identifier.
    #[must_use]
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NODE_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanline_protocol::validate_node_id;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_ids_are_valid_channel_components() {
        let id = NodeId::generate();
        assert_eq!(id.as_str().len(), NODE_ID_LEN);
        assert!(validate_node_id(id.as_str()).is_ok());
    }

    #[test]
    fn test_from_str() {
        let id: NodeId = "node-a".into();
        assert_eq!(id.as_str(), "node-a");
        assert_eq!(id.to_string(), "node-a");
    }
}
