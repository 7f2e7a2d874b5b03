//! Timeline fanout store.
//!
//! Owns two families of substrate keys: bounded per-user home timelines
//! (sorted by content timestamp, capped at [`TIMELINE_CAP`] entries) and
//! transient subscriber sets for broadcast topics. The two namespaces never
//! collide even though they share the substrate.
//!
//! Every mutation is issued as one atomic pipelined batch, so concurrent
//! fanout/fanin against the same recipient key cannot interleave partially.

use crate::content::ContentItem;
use fanline_substrate::{Batch, ScoredMember, Substrate, SubstrateError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Maximum entries retained per timeline after each mutation.
pub const TIMELINE_CAP: usize = 999;

const TIMELINE_KEY_PREFIX: &str = "fanline:timeline:home:";
const ACTION_TOPIC_PREFIX: &str = "fanline:topic:action:";
const LIVE_TOPIC_PREFIX: &str = "fanline:topic:live:";

/// Key for a user's home timeline.
#[must_use]
pub fn timeline_key(user_id: &str) -> String {
    format!("{TIMELINE_KEY_PREFIX}{user_id}")
}

/// Whether a distribution inserts or retracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Insert into follower timelines.
    Fanout,
    /// Retract from follower timelines.
    Fanin,
}

/// A broadcast topic keyed by the content it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Status-action (reaction) updates for a content item.
    Action(String),
    /// Live-video availability for a channel/content item.
    LiveVideo(String),
}

impl Topic {
    /// Substrate key for this topic's subscriber set.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Topic::Action(id) => format!("{ACTION_TOPIC_PREFIX}{id}"),
            Topic::LiveVideo(id) => format!("{LIVE_TOPIC_PREFIX}{id}"),
        }
    }

    /// The content id the topic concerns.
    #[must_use]
    pub fn content_id(&self) -> &str {
        match self {
            Topic::Action(id) | Topic::LiveVideo(id) => id,
        }
    }
}

/// A (score, member) pair stored per recipient timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    /// Content id.
    pub member: String,
    /// Content timestamp in epoch milliseconds.
    pub score: f64,
}

impl TimelineEntry {
    /// Build an entry from a content item.
    ///
    /// Returns `None` when the item carries no timestamp and therefore
    /// cannot be scored.
    #[must_use]
    pub fn from_item(item: &ContentItem) -> Option<Self> {
        item.created_at.map(|ts| Self {
            member: item.id.clone(),
            score: ts as f64,
        })
    }
}

/// Post-mutation notification for one recipient, consumed downstream for
/// routing. The receiving half is wired at construction time.
#[derive(Debug, Clone)]
pub struct FanoutNotice {
    /// Recipient whose timeline changed.
    pub recipient: String,
    /// The entry that was inserted or retracted.
    pub entry: TimelineEntry,
    /// Insert or retract.
    pub direction: Direction,
}

/// Bounded per-user timelines plus broadcast-topic subscriber sets.
#[derive(Clone)]
pub struct TimelineStore {
    substrate: Arc<dyn Substrate>,
    notices: mpsc::UnboundedSender<FanoutNotice>,
}

impl TimelineStore {
    /// Create a store over a substrate.
    ///
    /// `notices` receives one [`FanoutNotice`] per recipient after each
    /// successful fanout/fanin batch.
    #[must_use]
    pub fn new(substrate: Arc<dyn Substrate>, notices: mpsc::UnboundedSender<FanoutNotice>) -> Self {
        Self { substrate, notices }
    }

    /// Insert an entry into each recipient's timeline, trimming every
    /// timeline to its cap, as one atomic batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails; no notices are
    /// emitted in that case.
    pub async fn fanout(
        &self,
        entry: &TimelineEntry,
        recipients: &[String],
    ) -> Result<(), SubstrateError> {
        if recipients.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::new();
        for recipient in recipients {
            let key = timeline_key(recipient);
            batch = batch
                .sorted_insert(&key, entry.score, &entry.member)
                .sorted_trim(&key, TIMELINE_CAP);
        }
        self.substrate.apply(batch).await?;

        debug!(
            member = %entry.member,
            recipients = recipients.len(),
            "Fanned out timeline entry"
        );
        self.notify(entry, recipients, Direction::Fanout);
        Ok(())
    }

    /// Remove an entry from each recipient's timeline. The trim is
    /// idempotent and cheap, so it is reapplied unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn fanin(
        &self,
        entry: &TimelineEntry,
        recipients: &[String],
    ) -> Result<(), SubstrateError> {
        if recipients.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::new();
        for recipient in recipients {
            let key = timeline_key(recipient);
            batch = batch
                .sorted_remove(&key, &entry.member)
                .sorted_trim(&key, TIMELINE_CAP);
        }
        self.substrate.apply(batch).await?;

        debug!(
            member = %entry.member,
            recipients = recipients.len(),
            "Retracted timeline entry"
        );
        self.notify(entry, recipients, Direction::Fanin);
        Ok(())
    }

    fn notify(&self, entry: &TimelineEntry, recipients: &[String], direction: Direction) {
        for recipient in recipients {
            let notice = FanoutNotice {
                recipient: recipient.clone(),
                entry: entry.clone(),
                direction,
            };
            // Receiver dropped means nothing downstream wants routing.
            if self.notices.send(notice).is_err() {
                trace!("Notice receiver dropped");
                return;
            }
        }
    }

    /// Add a subscriber to a topic. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn add_subscriber(&self, topic: &Topic, user_id: &str) -> Result<(), SubstrateError> {
        self.substrate
            .apply(Batch::new().set_add(topic.key(), user_id))
            .await
    }

    /// Remove a subscriber from a topic. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn remove_subscriber(
        &self,
        topic: &Topic,
        user_id: &str,
    ) -> Result<(), SubstrateError> {
        self.substrate
            .apply(Batch::new().set_remove(topic.key(), user_id))
            .await
    }

    /// All subscribers of a topic; empty when the topic has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn list_subscribers(&self, topic: &Topic) -> Result<Vec<String>, SubstrateError> {
        self.substrate.set_members(&topic.key()).await
    }

    /// Delete a topic's entire subscriber set, e.g. when the underlying
    /// content item is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn drop_topic(&self, topic: &Topic) -> Result<(), SubstrateError> {
        debug!(key = %topic.key(), "Dropping topic");
        self.substrate.apply(Batch::new().delete(topic.key())).await
    }

    /// A user's timeline in ascending score order.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn timeline(&self, user_id: &str) -> Result<Vec<ScoredMember>, SubstrateError> {
        self.substrate.sorted_members(&timeline_key(user_id)).await
    }

    /// Number of entries in a user's timeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate round trip fails.
    pub async fn timeline_len(&self, user_id: &str) -> Result<usize, SubstrateError> {
        self.substrate.sorted_len(&timeline_key(user_id)).await
    }
}
