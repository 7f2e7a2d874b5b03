//! Fanout orchestrator.
//!
//! Given a content item and its producing user, resolves the follower
//! audience and drives the timeline store in bounded chunks. Fanout and
//! fanin are symmetric; only audience resolution failures surface to the
//! caller, everything past that point is best-effort.

use crate::content::{AudienceError, AudienceResolver, ContentItem, REPLY_EXEMPT_KIND};
use crate::timeline::{Direction, TimelineEntry, TimelineStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Audience members per store batch.
pub const CHUNK_SIZE: usize = 500;

/// Distribution errors surfaced to content producers.
#[derive(Debug, Error)]
pub enum DistributeError {
    /// The follower list could not be resolved; content creation should
    /// fail visibly.
    #[error(transparent)]
    Audience(#[from] AudienceError),
}

/// Chunks audiences and drives the timeline store.
pub struct FanoutOrchestrator {
    audience: Arc<dyn AudienceResolver>,
    store: TimelineStore,
    chunk_size: usize,
}

impl FanoutOrchestrator {
    /// Create an orchestrator with the default chunk size.
    #[must_use]
    pub fn new(audience: Arc<dyn AudienceResolver>, store: TimelineStore) -> Self {
        Self::with_chunk_size(audience, store, CHUNK_SIZE)
    }

    /// Create an orchestrator with a custom chunk size.
    #[must_use]
    pub fn with_chunk_size(
        audience: Arc<dyn AudienceResolver>,
        store: TimelineStore,
        chunk_size: usize,
    ) -> Self {
        Self {
            audience,
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Distribute a content item to (or retract it from) the timelines of
    /// its producer's followers.
    ///
    /// Replies are excluded from distribution unless their kind is the
    /// reply-exempt category. Chunks beyond the first are dispatched
    /// without awaiting completion; a failing chunk is logged and does not
    /// block or roll back the others.
    ///
    /// # Errors
    ///
    /// Returns an error only when the audience cannot be resolved.
    pub async fn distribute(
        &self,
        direction: Direction,
        owner_id: &str,
        item: &ContentItem,
    ) -> Result<(), DistributeError> {
        if item.is_reply && item.kind != REPLY_EXEMPT_KIND {
            debug!(item = %item.id, kind = %item.kind, "Skipping reply distribution");
            return Ok(());
        }

        let Some(entry) = TimelineEntry::from_item(item) else {
            warn!(item = %item.id, "Item has no timestamp, skipping distribution");
            return Ok(());
        };

        let followers = self.audience.followers(owner_id).await?;
        if followers.is_empty() {
            debug!(owner = %owner_id, "No audience to distribute to");
            return Ok(());
        }

        debug!(
            owner = %owner_id,
            item = %item.id,
            audience = followers.len(),
            chunks = followers.len().div_ceil(self.chunk_size),
            ?direction,
            "Distributing"
        );

        let mut chunks = followers.chunks(self.chunk_size);

        // First chunk runs inline; its failure is logged, not surfaced.
        if let Some(first) = chunks.next() {
            if let Err(e) = self.dispatch(direction, &entry, first).await {
                warn!(item = %entry.member, error = %e, "Chunk dispatch failed");
            }
        }

        // Remaining chunks are fire-and-forget.
        for chunk in chunks {
            let store = self.store.clone();
            let entry = entry.clone();
            let chunk: Vec<String> = chunk.to_vec();
            tokio::spawn(async move {
                let result = match direction {
                    Direction::Fanout => store.fanout(&entry, &chunk).await,
                    Direction::Fanin => store.fanin(&entry, &chunk).await,
                };
                if let Err(e) = result {
                    warn!(item = %entry.member, error = %e, "Chunk dispatch failed");
                }
            });
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        direction: Direction,
        entry: &TimelineEntry,
        recipients: &[String],
    ) -> Result<(), fanline_substrate::SubstrateError> {
        match direction {
            Direction::Fanout => self.store.fanout(entry, recipients).await,
            Direction::Fanin => self.store.fanin(entry, recipients).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryAudience;
    use fanline_substrate::{MemorySubstrate, Substrate};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fixture() -> (FanoutOrchestrator, Arc<MemorySubstrate>, Arc<MemoryAudience>) {
        let substrate = Arc::new(MemorySubstrate::new());
        let audience = Arc::new(MemoryAudience::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = TimelineStore::new(substrate.clone(), tx);
        let orchestrator = FanoutOrchestrator::new(audience.clone(), store);
        (orchestrator, substrate, audience)
    }

    async fn wait_for_batches(substrate: &MemorySubstrate, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while substrate.stats().batches_applied < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("batches never arrived");
    }

    #[tokio::test]
    async fn test_fanout_then_fanin_end_to_end() {
        let (orchestrator, substrate, audience) = fixture();
        audience.set_followers("u1", vec!["a".into(), "b".into(), "c".into()]);
        let item = ContentItem::new("p1", "u1", 1_700_000_000_000);

        orchestrator
            .distribute(Direction::Fanout, "u1", &item)
            .await
            .unwrap();

        for user in ["a", "b", "c"] {
            let members = substrate
                .sorted_members(&crate::timeline::timeline_key(user))
                .await
                .unwrap();
            assert_eq!(members.len(), 1);
            assert_eq!(members[0].member, "p1");
            assert_eq!(members[0].score, 1_700_000_000_000.0);
        }

        orchestrator
            .distribute(Direction::Fanin, "u1", &item)
            .await
            .unwrap();

        for user in ["a", "b", "c"] {
            assert_eq!(
                substrate
                    .sorted_len(&crate::timeline::timeline_key(user))
                    .await
                    .unwrap(),
                0
            );
        }
    }

    #[tokio::test]
    async fn test_reply_is_not_distributed() {
        let (orchestrator, substrate, audience) = fixture();
        audience.set_followers("u1", vec!["a".into()]);
        let reply = ContentItem::new("p1", "u1", 1).as_reply();

        orchestrator
            .distribute(Direction::Fanout, "u1", &reply)
            .await
            .unwrap();

        assert_eq!(substrate.stats().batches_applied, 0);
    }

    #[tokio::test]
    async fn test_exempt_reply_kind_is_distributed() {
        let (orchestrator, substrate, audience) = fixture();
        audience.set_followers("u1", vec!["a".into()]);
        let reply = ContentItem::new("p1", "u1", 1)
            .as_reply()
            .with_kind(REPLY_EXEMPT_KIND);

        orchestrator
            .distribute(Direction::Fanout, "u1", &reply)
            .await
            .unwrap();

        assert_eq!(substrate.stats().batches_applied, 1);
    }

    #[tokio::test]
    async fn test_unscored_item_is_skipped() {
        let (orchestrator, substrate, audience) = fixture();
        audience.set_followers("u1", vec!["a".into()]);
        let mut item = ContentItem::new("p1", "u1", 1);
        item.created_at = None;

        orchestrator
            .distribute(Direction::Fanout, "u1", &item)
            .await
            .unwrap();

        assert_eq!(substrate.stats().batches_applied, 0);
    }

    #[tokio::test]
    async fn test_audience_chunking() {
        let (orchestrator, substrate, audience) = fixture();
        let followers: Vec<String> = (0..1200).map(|i| format!("u{i}")).collect();
        audience.set_followers("u1", followers);
        let item = ContentItem::new("p1", "u1", 1);

        orchestrator
            .distribute(Direction::Fanout, "u1", &item)
            .await
            .unwrap();

        // 1200 followers at 500 per chunk: 500 + 500 + 200.
        wait_for_batches(&substrate, 3).await;
        assert_eq!(substrate.stats().batches_applied, 3);
        assert_eq!(
            substrate
                .sorted_len(&crate::timeline::timeline_key("u1199"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_audience_failure_propagates() {
        struct FailingAudience;

        #[async_trait::async_trait]
        impl AudienceResolver for FailingAudience {
            async fn followers(&self, _user_id: &str) -> Result<Vec<String>, AudienceError> {
                Err(AudienceError::Resolve("graph store down".into()))
            }
        }

        let substrate = Arc::new(MemorySubstrate::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = TimelineStore::new(substrate, tx);
        let orchestrator = FanoutOrchestrator::new(Arc::new(FailingAudience), store);
        let item = ContentItem::new("p1", "u1", 1);

        let result = orchestrator.distribute(Direction::Fanout, "u1", &item).await;
        assert!(matches!(result, Err(DistributeError::Audience(_))));
    }
}
