//! Substrate abstraction traits.
//!
//! These traits define the interface every substrate backend must provide,
//! allowing the engine to be backend-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Substrate errors.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// Could not reach the backend.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The backend rejected or failed an operation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The subscription or connection was closed.
    #[error("Substrate closed")]
    Closed,
}

/// A (score, member) pair from a sorted key.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    /// Numeric score; sorted keys order by this, then by member.
    pub score: f64,
    /// Member value.
    pub member: String,
}

impl ScoredMember {
    /// Create a new scored member.
    #[must_use]
    pub fn new(score: f64, member: impl Into<String>) -> Self {
        Self {
            score,
            member: member.into(),
        }
    }
}

/// A single substrate mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert (or re-score) a member in a sorted key.
    SortedInsert {
        key: String,
        score: f64,
        member: String,
    },
    /// Retain only the `keep` highest-scored members of a sorted key.
    SortedTrim { key: String, keep: usize },
    /// Remove a member from a sorted key.
    SortedRemove { key: String, member: String },
    /// Add a member to a set key.
    SetAdd { key: String, member: String },
    /// Remove a member from a set key.
    SetRemove { key: String, member: String },
    /// Delete a key entirely.
    Delete { key: String },
}

/// An atomic pipelined batch of mutations.
///
/// The whole batch executes as a single substrate round trip; commands on
/// the same key apply in order with no interleaving from other writers.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sorted-set insert.
    #[must_use]
    pub fn sorted_insert(
        mut self,
        key: impl Into<String>,
        score: f64,
        member: impl Into<String>,
    ) -> Self {
        self.commands.push(Command::SortedInsert {
            key: key.into(),
            score,
            member: member.into(),
        });
        self
    }

    /// Append a trim keeping the `keep` highest-scored members.
    #[must_use]
    pub fn sorted_trim(mut self, key: impl Into<String>, keep: usize) -> Self {
        self.commands.push(Command::SortedTrim {
            key: key.into(),
            keep,
        });
        self
    }

    /// Append a sorted-set removal.
    #[must_use]
    pub fn sorted_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SortedRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Append a set add.
    #[must_use]
    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Append a set removal.
    #[must_use]
    pub fn set_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Append a key deletion.
    #[must_use]
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.commands.push(Command::Delete { key: key.into() });
        self
    }

    /// Number of commands in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Consume the batch, yielding its commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// Borrow the commands.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

/// An active pub/sub subscription.
///
/// Messages arrive in publish order per channel. The stream ends when the
/// backend drops the subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl Subscription {
    /// Wrap a receiver into a subscription.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Receive the next message.
    ///
    /// Returns `None` when the subscription has ended.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// The shared substrate every node talks to.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Execute a batch of mutations as one atomic pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails; no partial application is
    /// observable on a per-key basis.
    async fn apply(&self, batch: Batch) -> Result<(), SubstrateError>;

    /// All members of a sorted key in ascending score order.
    ///
    /// An absent key yields an empty vec.
    async fn sorted_members(&self, key: &str) -> Result<Vec<ScoredMember>, SubstrateError>;

    /// Number of members in a sorted key.
    async fn sorted_len(&self, key: &str) -> Result<usize, SubstrateError>;

    /// All members of a set key. An absent key yields an empty vec.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, SubstrateError>;

    /// Publish a message to a channel. Fire-and-forget at the substrate
    /// level: delivery to zero subscribers is not an error.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), SubstrateError>;

    /// Subscribe to a channel.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubstrateError>;
}
