//! Presence directory interface.
//!
//! The presence directory maps a user to the node and connection currently
//! holding their live session. fanline reads it, it does not own it:
//! absence is the expected "recipient offline" state, never an error.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a user's live connection currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Connection held by the owning node.
    pub connection_id: String,
    /// Node terminating the connection.
    pub node_id: String,
    /// The connected user.
    pub user_id: String,
}

impl PresenceRecord {
    /// Create a new presence record.
    #[must_use]
    pub fn new(
        connection_id: impl Into<String>,
        node_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            node_id: node_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Presence lookup errors.
///
/// Only infrastructure failures surface here; a user with no live
/// connection is `Ok(None)`.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The directory could not be reached.
    #[error("Presence lookup failed: {0}")]
    Lookup(String),
}

/// Read access to the presence directory.
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    /// Look up a user's live connection, if any.
    async fn presence_of(&self, user_id: &str)
        -> Result<Option<PresenceRecord>, PresenceError>;

    /// Look up the record for a specific connection, if it is live.
    async fn presence_of_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<PresenceRecord>, PresenceError>;
}

/// In-process presence directory for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryPresence {
    by_user: DashMap<String, PresenceRecord>,
}

impl MemoryPresence {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user as connected.
    pub fn connect(&self, record: PresenceRecord) {
        self.by_user.insert(record.user_id.clone(), record);
    }

    /// Remove a user's presence.
    pub fn disconnect(&self, user_id: &str) {
        self.by_user.remove(user_id);
    }
}

#[async_trait]
impl PresenceDirectory for MemoryPresence {
    async fn presence_of(
        &self,
        user_id: &str,
    ) -> Result<Option<PresenceRecord>, PresenceError> {
        Ok(self.by_user.get(user_id).map(|r| r.clone()))
    }

    async fn presence_of_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<PresenceRecord>, PresenceError> {
        Ok(self
            .by_user
            .iter()
            .find(|r| r.connection_id == connection_id)
            .map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_disconnect() {
        let directory = MemoryPresence::new();
        directory.connect(PresenceRecord::new("conn-1", "node-a", "u1"));

        let record = directory.presence_of("u1").await.unwrap().unwrap();
        assert_eq!(record.node_id, "node-a");
        assert_eq!(record.connection_id, "conn-1");

        directory.disconnect("u1");
        assert!(directory.presence_of("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_connection() {
        let directory = MemoryPresence::new();
        directory.connect(PresenceRecord::new("conn-1", "node-a", "u1"));

        let record = directory
            .presence_of_connection("conn-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, "u1");
        assert!(directory
            .presence_of_connection("conn-2")
            .await
            .unwrap()
            .is_none());
    }
}
