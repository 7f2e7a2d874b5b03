//! In-process substrate backend.
//!
//! Backs tests, development, and single-node deployments. Sorted and plain
//! sets live under one mutex, which makes batch atomicity trivial; pub/sub
//! fans out to per-channel registered senders.

use crate::traits::{Batch, Command, ScoredMember, Subscription, Substrate, SubstrateError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Default)]
struct MemoryState {
    sorted: HashMap<String, Vec<ScoredMember>>,
    sets: HashMap<String, HashSet<String>>,
}

impl MemoryState {
    fn apply(&mut self, command: Command) {
        match command {
            Command::SortedInsert { key, score, member } => {
                let entries = self.sorted.entry(key).or_default();
                entries.retain(|e| e.member != member);
                let at = entries.partition_point(|e| {
                    (e.score, e.member.as_str()) < (score, member.as_str())
                });
                entries.insert(at, ScoredMember::new(score, member));
            }
            Command::SortedTrim { key, keep } => {
                if let Some(entries) = self.sorted.get_mut(&key) {
                    // Entries are ascending, so evict from the low-score end.
                    if entries.len() > keep {
                        let excess = entries.len() - keep;
                        entries.drain(..excess);
                    }
                    if entries.is_empty() {
                        self.sorted.remove(&key);
                    }
                }
            }
            Command::SortedRemove { key, member } => {
                if let Some(entries) = self.sorted.get_mut(&key) {
                    entries.retain(|e| e.member != member);
                    if entries.is_empty() {
                        self.sorted.remove(&key);
                    }
                }
            }
            Command::SetAdd { key, member } => {
                self.sets.entry(key).or_default().insert(member);
            }
            Command::SetRemove { key, member } => {
                if let Some(members) = self.sets.get_mut(&key) {
                    members.remove(&member);
                    if members.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            }
            Command::Delete { key } => {
                self.sorted.remove(&key);
                self.sets.remove(&key);
            }
        }
    }
}

/// Statistics snapshot for the memory backend.
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Batches applied since creation.
    pub batches_applied: u64,
    /// Messages published since creation.
    pub publishes: u64,
    /// Live sorted keys.
    pub sorted_keys: usize,
    /// Live set keys.
    pub set_keys: usize,
}

/// Single-process substrate backend.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    state: Mutex<MemoryState>,
    channels: DashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>,
    batches_applied: AtomicU64,
    publishes: AtomicU64,
}

impl MemorySubstrate {
    /// Create a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get backend statistics.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        MemoryStats {
            batches_applied: self.batches_applied.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            sorted_keys: state.sorted.len(),
            set_keys: state.sets.len(),
        }
    }

    /// Number of live subscribers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn apply(&self, batch: Batch) -> Result<(), SubstrateError> {
        if batch.is_empty() {
            return Ok(());
        }
        let commands = batch.into_commands();
        trace!(commands = commands.len(), "Applying batch");
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            for command in commands {
                state.apply(command);
            }
        }
        self.batches_applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn sorted_members(&self, key: &str) -> Result<Vec<ScoredMember>, SubstrateError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.sorted.get(key).cloned().unwrap_or_default())
    }

    async fn sorted_len(&self, key: &str) -> Result<usize, SubstrateError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.sorted.get(key).map(Vec::len).unwrap_or(0))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, SubstrateError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), SubstrateError> {
        self.publishes.fetch_add(1, Ordering::Relaxed);
        if let Some(mut senders) = self.channels.get_mut(channel) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubstrateError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.entry(channel.to_string()).or_default().push(tx);
        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sorted_insert_and_trim() {
        let store = MemorySubstrate::new();

        let mut batch = Batch::new();
        for i in 0..10 {
            batch = batch.sorted_insert("t:u1", f64::from(i), format!("p{i}"));
        }
        batch = batch.sorted_trim("t:u1", 3);
        store.apply(batch).await.unwrap();

        let members = store.sorted_members("t:u1").await.unwrap();
        assert_eq!(members.len(), 3);
        // Highest-scored survive.
        assert_eq!(members[0].member, "p7");
        assert_eq!(members[2].member, "p9");
    }

    #[tokio::test]
    async fn test_sorted_insert_rescores_member() {
        let store = MemorySubstrate::new();
        store
            .apply(
                Batch::new()
                    .sorted_insert("t:u1", 1.0, "p1")
                    .sorted_insert("t:u1", 5.0, "p1"),
            )
            .await
            .unwrap();

        let members = store.sorted_members("t:u1").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].score, 5.0);
    }

    #[tokio::test]
    async fn test_sorted_remove_clears_empty_key() {
        let store = MemorySubstrate::new();
        store
            .apply(Batch::new().sorted_insert("t:u1", 1.0, "p1"))
            .await
            .unwrap();
        store
            .apply(Batch::new().sorted_remove("t:u1", "p1"))
            .await
            .unwrap();

        assert_eq!(store.sorted_len("t:u1").await.unwrap(), 0);
        assert_eq!(store.stats().sorted_keys, 0);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemorySubstrate::new();
        store
            .apply(
                Batch::new()
                    .set_add("topic:a", "u1")
                    .set_add("topic:a", "u2")
                    .set_add("topic:a", "u1"),
            )
            .await
            .unwrap();

        let mut members = store.set_members("topic:a").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["u1", "u2"]);

        store
            .apply(Batch::new().set_remove("topic:a", "u1"))
            .await
            .unwrap();
        assert_eq!(store.set_members("topic:a").await.unwrap(), vec!["u2"]);

        store.apply(Batch::new().delete("topic:a")).await.unwrap();
        assert!(store.set_members("topic:a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_absent_keys_read_empty() {
        let store = MemorySubstrate::new();
        assert!(store.sorted_members("nope").await.unwrap().is_empty());
        assert_eq!(store.sorted_len("nope").await.unwrap(), 0);
        assert!(store.set_members("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let store = MemorySubstrate::new();
        let mut sub = store.subscribe("ch:1").await.unwrap();

        store
            .publish("ch:1", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        store
            .publish("ch:2", Bytes::from_static(b"other"))
            .await
            .unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(&msg[..], b"hello");
        assert_eq!(store.stats().publishes, 2);
    }

    #[tokio::test]
    async fn test_batch_count_observable() {
        let store = MemorySubstrate::new();
        store
            .apply(Batch::new().sorted_insert("t:u1", 1.0, "p1"))
            .await
            .unwrap();
        store.apply(Batch::new()).await.unwrap(); // empty, not counted
        store
            .apply(Batch::new().sorted_insert("t:u2", 1.0, "p1"))
            .await
            .unwrap();

        assert_eq!(store.stats().batches_applied, 2);
    }
}
