//! Routing gateway.
//!
//! The entry point for delivering a single logical event to one recipient:
//! look the recipient up in the presence directory, then either emit on the
//! locally held connection or hand an envelope to the relay addressed to
//! the owning node. "Recipient offline" is the most common outcome and is
//! a cheap, silent no-op.

use crate::content::{AudienceError, ContentItem, ContentProvider};
use crate::identity::NodeId;
use crate::presence::{PresenceDirectory, PresenceError, PresenceRecord};
use crate::relay::{EnvelopeDispatch, RelaySender};
use crate::timeline::{Direction, FanoutNotice, TimelineStore, Topic};
use async_trait::async_trait;
use fanline_protocol::{EnvelopeData, MessageKind, RoutedEnvelope};
use fanline_substrate::SubstrateError;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed input, rejected before any lookup or mutation.
    #[error("Missing required field: {0}")]
    Validation(&'static str),

    /// Subscriber-management caller has no live connection.
    #[error("Not currently connected: {0}")]
    NotConnected(String),

    /// Presence directory failure.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// Substrate failure.
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    /// Content/profile collaborator failure.
    #[error(transparent)]
    Profile(#[from] AudienceError),

    /// Local emission failure.
    #[error("Local delivery failed: {0}")]
    Emit(#[from] EmitError),
}

/// Failure emitting on a locally held connection.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EmitError(pub String);

/// Emits an event on a connection held by this node.
///
/// Implemented by whatever transport layer terminates client connections.
#[async_trait]
pub trait LocalEmitter: Send + Sync {
    /// Emit `event` with `payload` on the given connection.
    async fn emit(
        &self,
        connection_id: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), EmitError>;
}

/// One logical event to route to a recipient.
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    /// Event family.
    pub kind: MessageKind,
    /// Client-facing event name.
    pub name: String,
    /// Producing user, when one exists.
    pub from_user: Option<String>,
    /// Event payload.
    pub object: Value,
}

impl RoutedEvent {
    /// Create a timeline-update event.
    #[must_use]
    pub fn timeline(from_user: impl Into<String>, object: Value) -> Self {
        Self {
            kind: MessageKind::Timeline,
            name: "timeline:update".to_string(),
            from_user: Some(from_user.into()),
            object,
        }
    }

    /// Create a status-action event.
    #[must_use]
    pub fn action(object: Value) -> Self {
        Self {
            kind: MessageKind::Action,
            name: "post:action".to_string(),
            from_user: None,
            object,
        }
    }

    /// Create a live-video availability event.
    #[must_use]
    pub fn live_video(object: Value) -> Self {
        Self {
            kind: MessageKind::LiveVideo,
            name: "live:available".to_string(),
            from_user: None,
            object,
        }
    }

    /// Create a generic routed event.
    #[must_use]
    pub fn direct(name: impl Into<String>, from_user: impl Into<String>, object: Value) -> Self {
        Self {
            kind: MessageKind::Direct,
            name: name.into(),
            from_user: Some(from_user.into()),
            object,
        }
    }
}

/// Outcome of routing one event to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Recipient has no live connection; nothing was sent.
    Offline,
    /// Emitted directly on the locally held connection.
    Local,
    /// Handed to the relay, addressed to the owning node.
    Forwarded(String),
}

/// Tally of a topic broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Recipients that received the event (locally or forwarded).
    pub delivered: usize,
    /// Recipients with no live connection.
    pub offline: usize,
    /// Recipients whose delivery failed.
    pub failed: usize,
}

/// Decides and executes per-recipient delivery.
pub struct Gateway {
    node_id: NodeId,
    presence: Arc<dyn PresenceDirectory>,
    content: Arc<dyn ContentProvider>,
    store: TimelineStore,
    relay: RelaySender,
    emitter: Arc<dyn LocalEmitter>,
}

impl Gateway {
    /// Create a gateway. The node identity is owned by the composition
    /// root and passed in; the gateway never generates one.
    #[must_use]
    pub fn new(
        node_id: NodeId,
        presence: Arc<dyn PresenceDirectory>,
        content: Arc<dyn ContentProvider>,
        store: TimelineStore,
        relay: RelaySender,
        emitter: Arc<dyn LocalEmitter>,
    ) -> Self {
        Self {
            node_id,
            presence,
            content,
            store,
            relay,
            emitter,
        }
    }

    /// This node's identity.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Route one event to one recipient.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input, and propagates
    /// presence-directory and local-emission failures. An offline
    /// recipient is `Ok(Delivery::Offline)`, never an error.
    pub async fn route_to_user(
        &self,
        recipient_id: &str,
        event: &RoutedEvent,
    ) -> Result<Delivery, GatewayError> {
        if recipient_id.is_empty() {
            return Err(GatewayError::Validation("recipient_id"));
        }
        if event.name.is_empty() {
            return Err(GatewayError::Validation("event"));
        }

        let Some(record) = self.presence.presence_of(recipient_id).await? else {
            trace!(recipient = %recipient_id, "Recipient offline, skipping");
            return Ok(Delivery::Offline);
        };

        if record.node_id == self.node_id.as_str() {
            self.emit_local(&record.connection_id, &event.name, &event.object)
                .await?;
            debug!(recipient = %recipient_id, event = %event.name, "Delivered locally");
            return Ok(Delivery::Local);
        }

        let envelope = self.build_envelope(&record, event);
        self.relay.send(&record.node_id, &envelope).await;
        debug!(
            recipient = %recipient_id,
            event = %event.name,
            target = %record.node_id,
            "Forwarded to owning node"
        );
        Ok(Delivery::Forwarded(record.node_id))
    }

    fn build_envelope(&self, record: &PresenceRecord, event: &RoutedEvent) -> RoutedEnvelope {
        let data = EnvelopeData::new(
            event.from_user.clone().unwrap_or_default(),
            record.user_id.clone(),
            self.node_id.as_str(),
            record.node_id.clone(),
        )
        .with_to_client(record.connection_id.clone())
        .with_object(event.object.clone());
        RoutedEnvelope::new(event.kind, event.name.clone(), data)
    }

    async fn emit_local(
        &self,
        connection_id: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), GatewayError> {
        Ok(self.emitter.emit(connection_id, event, payload).await?)
    }

    /// Notify one recipient that their timeline changed.
    ///
    /// Builds the notification payload from the item and its author's
    /// public profile, then routes it as a timeline event.
    ///
    /// # Errors
    ///
    /// Propagates profile-lookup failures and per-recipient delivery
    /// failures.
    pub async fn fanout_notify(
        &self,
        recipient_id: &str,
        item: &ContentItem,
        direction: Direction,
    ) -> Result<Delivery, GatewayError> {
        let author = self.content.author_profile(&item.owner_id).await?;

        let verb = match direction {
            Direction::Fanout => "add",
            Direction::Fanin => "remove",
        };
        let object = json!({
            "id": item.id,
            "created_at": item.created_at,
            "change": verb,
            "author": author,
        });

        self.route_to_user(recipient_id, &RoutedEvent::timeline(&item.owner_id, object))
            .await
    }

    /// Handle a post-fanout notice from the timeline store: resolve the
    /// content item and notify the recipient. Notices for content that has
    /// since disappeared are skipped.
    ///
    /// # Errors
    ///
    /// Propagates content-lookup and delivery failures.
    pub async fn handle_notice(&self, notice: FanoutNotice) -> Result<Delivery, GatewayError> {
        let Some(item) = self.content.item(&notice.entry.member).await? else {
            trace!(item = %notice.entry.member, "Notice for vanished content, skipping");
            return Ok(Delivery::Offline);
        };
        self.fanout_notify(&notice.recipient, &item, notice.direction)
            .await
    }

    /// Broadcast a status-action payload to the content's reaction topic.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty content id, and propagates
    /// the subscriber-set read failure. Per-recipient failures are logged
    /// and counted, not raised.
    pub async fn action_fanout(
        &self,
        content_id: &str,
        action: Value,
    ) -> Result<BroadcastOutcome, GatewayError> {
        if content_id.is_empty() {
            return Err(GatewayError::Validation("content_id"));
        }
        let topic = Topic::Action(content_id.to_string());
        let event = RoutedEvent::action(json!({ "id": content_id, "action": action }));
        self.broadcast(&topic, &event).await
    }

    /// Broadcast live-video availability to the content's live topic.
    ///
    /// # Errors
    ///
    /// Same contract as [`Gateway::action_fanout`].
    pub async fn live_video_fanout(
        &self,
        content_id: &str,
        video_url: &str,
    ) -> Result<BroadcastOutcome, GatewayError> {
        if content_id.is_empty() {
            return Err(GatewayError::Validation("content_id"));
        }
        if video_url.is_empty() {
            return Err(GatewayError::Validation("video_url"));
        }
        let topic = Topic::LiveVideo(content_id.to_string());
        let event = RoutedEvent::live_video(json!({ "id": content_id, "url": video_url }));
        self.broadcast(&topic, &event).await
    }

    async fn broadcast(
        &self,
        topic: &Topic,
        event: &RoutedEvent,
    ) -> Result<BroadcastOutcome, GatewayError> {
        // A failed subscriber read is unrecoverable for the whole
        // broadcast; individual recipients are best-effort after that.
        let subscribers = self.store.list_subscribers(topic).await?;
        let mut outcome = BroadcastOutcome::default();

        for subscriber in &subscribers {
            match self.route_to_user(subscriber, event).await {
                Ok(Delivery::Offline) => outcome.offline += 1,
                Ok(_) => outcome.delivered += 1,
                Err(e) => {
                    warn!(
                        subscriber = %subscriber,
                        event = %event.name,
                        error = %e,
                        "Broadcast delivery failed"
                    );
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            key = %topic.key(),
            delivered = outcome.delivered,
            offline = outcome.offline,
            failed = outcome.failed,
            "Broadcast complete"
        );
        Ok(outcome)
    }

    /// Subscribe a connected user to a broadcast topic.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotConnected`] when the user has no live
    /// connection; these calls only originate from live connections, so
    /// absence indicates misuse.
    pub async fn subscribe_to_content(
        &self,
        user_id: &str,
        topic: &Topic,
    ) -> Result<(), GatewayError> {
        self.require_connected(user_id).await?;
        self.store.add_subscriber(topic, user_id).await?;
        Ok(())
    }

    /// Remove a connected user from a broadcast topic.
    ///
    /// # Errors
    ///
    /// Same contract as [`Gateway::subscribe_to_content`].
    pub async fn unsubscribe(&self, user_id: &str, topic: &Topic) -> Result<(), GatewayError> {
        self.require_connected(user_id).await?;
        self.store.remove_subscriber(topic, user_id).await?;
        Ok(())
    }

    async fn require_connected(&self, user_id: &str) -> Result<PresenceRecord, GatewayError> {
        if user_id.is_empty() {
            return Err(GatewayError::Validation("user_id"));
        }
        self.presence
            .presence_of(user_id)
            .await?
            .ok_or_else(|| GatewayError::NotConnected(user_id.to_string()))
    }

    /// Connection lifecycle: a connection arrived on this node. Presence
    /// is owned by the directory; nothing to create here.
    pub fn on_connect(&self, connection_id: &str) {
        trace!(node = %self.node_id, connection = %connection_id, "Connection opened");
    }

    /// Connection lifecycle: a connection left this node. Subscriber sets
    /// are not pruned; stale entries are skipped at delivery time.
    pub fn on_disconnect(&self, connection_id: &str) {
        trace!(node = %self.node_id, connection = %connection_id, "Connection closed");
    }
}

#[async_trait]
impl EnvelopeDispatch for Gateway {
    /// Local delivery of an inbound envelope from another node.
    async fn dispatch(&self, envelope: RoutedEnvelope) {
        // Exhaustive on purpose: a new event family must decide its
        // inbound handling here.
        match envelope.kind {
            MessageKind::Timeline
            | MessageKind::Action
            | MessageKind::LiveVideo
            | MessageKind::Direct => {
                self.deliver_inbound(envelope).await;
            }
        }
    }
}

impl Gateway {
    async fn deliver_inbound(&self, envelope: RoutedEnvelope) {
        // Prefer the connection pinned at send time; fall back to a fresh
        // presence lookup if the envelope predates a reconnect.
        let connection_id = match &envelope.data.to_client_id {
            Some(connection_id) => Some(connection_id.clone()),
            None => match self.presence.presence_of(envelope.recipient()).await {
                Ok(record) => record.map(|r| r.connection_id),
                Err(e) => {
                    warn!(error = %e, "Inbound presence lookup failed");
                    None
                }
            },
        };

        let Some(connection_id) = connection_id else {
            trace!(recipient = %envelope.recipient(), "Inbound recipient gone, skipping");
            return;
        };

        if let Err(e) = self
            .emit_local(&connection_id, &envelope.event, &envelope.data.object)
            .await
        {
            warn!(
                recipient = %envelope.recipient(),
                event = %envelope.event,
                error = %e,
                "Inbound local delivery failed"
            );
        }
    }
}
