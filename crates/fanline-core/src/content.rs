//! Content metadata and audience interfaces.
//!
//! The persistent content and social-graph stores are external
//! collaborators; this module defines the read-only views fanline needs
//! from them, plus in-process fixtures used by the node binary and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content kind whose replies are still distributed to timelines.
pub const REPLY_EXEMPT_KIND: &str = "competition";

/// A content item being fanned out.
///
/// Owned by the content subsystem; the engine treats it as read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Unique content identifier.
    pub id: String,
    /// Producing user.
    pub owner_id: String,
    /// Creation time in epoch milliseconds. Items without one cannot be
    /// scored and are skipped by distribution.
    pub created_at: Option<u64>,
    /// Whether this item is a reply to another item.
    pub is_reply: bool,
    /// Content class, used to exclude certain classes from fanout.
    pub kind: String,
}

impl ContentItem {
    /// Create a new content item.
    #[must_use]
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, created_at: u64) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            created_at: Some(created_at),
            is_reply: false,
            kind: "post".to_string(),
        }
    }

    /// Mark the item as a reply.
    #[must_use]
    pub fn as_reply(mut self) -> Self {
        self.is_reply = true;
        self
    }

    /// Set the content kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// Public profile of a producing user, used to build notification payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    /// User identifier.
    pub user_id: String,
    /// Handle.
    pub username: String,
    /// Display name, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar location, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl AuthorProfile {
    /// Create a minimal profile.
    #[must_use]
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            display_name: None,
            avatar_url: None,
        }
    }
}

/// Errors from the external content/audience collaborators.
#[derive(Debug, Error)]
pub enum AudienceError {
    /// The collaborator could not be reached or failed.
    #[error("Audience resolution failed: {0}")]
    Resolve(String),
}

/// Resolves the full follower list for a producing user.
///
/// The sequence is unbounded; chunking it is the engine's job.
#[async_trait]
pub trait AudienceResolver: Send + Sync {
    /// All follower user ids of `user_id`.
    async fn followers(&self, user_id: &str) -> Result<Vec<String>, AudienceError>;
}

/// Read-only content metadata accessors.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Fetch a content item by id.
    async fn item(&self, content_id: &str) -> Result<Option<ContentItem>, AudienceError>;

    /// Fetch the public profile of a user.
    async fn author_profile(&self, user_id: &str)
        -> Result<Option<AuthorProfile>, AudienceError>;
}

/// In-process audience resolver fixture.
#[derive(Debug, Default)]
pub struct MemoryAudience {
    followers: DashMap<String, Vec<String>>,
}

impl MemoryAudience {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the follower list for a user.
    pub fn set_followers(&self, user_id: impl Into<String>, followers: Vec<String>) {
        self.followers.insert(user_id.into(), followers);
    }
}

#[async_trait]
impl AudienceResolver for MemoryAudience {
    async fn followers(&self, user_id: &str) -> Result<Vec<String>, AudienceError> {
        Ok(self
            .followers
            .get(user_id)
            .map(|f| f.clone())
            .unwrap_or_default())
    }
}

/// In-process content store fixture.
#[derive(Debug, Default)]
pub struct MemoryContent {
    items: DashMap<String, ContentItem>,
    profiles: DashMap<String, AuthorProfile>,
}

impl MemoryContent {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a content item.
    pub fn put_item(&self, item: ContentItem) {
        self.items.insert(item.id.clone(), item);
    }

    /// Insert a profile.
    pub fn put_profile(&self, profile: AuthorProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ContentProvider for MemoryContent {
    async fn item(&self, content_id: &str) -> Result<Option<ContentItem>, AudienceError> {
        Ok(self.items.get(content_id).map(|i| i.clone()))
    }

    async fn author_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<AuthorProfile>, AudienceError> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }
}
