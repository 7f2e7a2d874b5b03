//! Envelope types for cross-node event routing.
//!
//! A `RoutedEnvelope` is the unit published to a node's inbound channel.
//! Envelopes are serialized as MessagePack maps for efficient binary encoding.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in milliseconds since UNIX epoch.
#[must_use]
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Routed event families.
///
/// Every envelope carries exactly one kind; inbound dispatch matches on it
/// exhaustively, so adding a family is a compile-time-checked extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum MessageKind {
    /// Timeline fanout/fanin notifications.
    Timeline = 0x01,
    /// Status-action (reaction) broadcasts.
    Action = 0x02,
    /// Live-video availability broadcasts.
    LiveVideo = 0x03,
    /// Generic single-recipient routed events.
    Direct = 0x04,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::Timeline),
            0x02 => Ok(MessageKind::Action),
            0x03 => Ok(MessageKind::LiveVideo),
            0x04 => Ok(MessageKind::Direct),
            _ => Err("Invalid message kind"),
        }
    }
}

/// Addressing and payload for a routed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeData {
    /// Producing user.
    pub from_user_id: String,
    /// Recipient user.
    pub to_user_id: String,
    /// Producing connection, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_client_id: Option<String>,
    /// Recipient connection, when known at send time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_client_id: Option<String>,
    /// Node that built the envelope.
    pub from_server_id: String,
    /// Node that owns the recipient's connection. An envelope is only ever
    /// published to this node's own channel.
    pub to_server_id: String,
    /// Free-form event payload.
    pub object: serde_json::Value,
    /// Epoch milliseconds at envelope construction.
    pub timestamp: u64,
}

impl EnvelopeData {
    /// Create envelope data with the required addressing fields.
    #[must_use]
    pub fn new(
        from_user_id: impl Into<String>,
        to_user_id: impl Into<String>,
        from_server_id: impl Into<String>,
        to_server_id: impl Into<String>,
    ) -> Self {
        Self {
            from_user_id: from_user_id.into(),
            to_user_id: to_user_id.into(),
            from_client_id: None,
            to_client_id: None,
            from_server_id: from_server_id.into(),
            to_server_id: to_server_id.into(),
            object: serde_json::Value::Null,
            timestamp: epoch_ms(),
        }
    }

    /// Set the producing connection.
    #[must_use]
    pub fn with_from_client(mut self, connection_id: impl Into<String>) -> Self {
        self.from_client_id = Some(connection_id.into());
        self
    }

    /// Set the recipient connection.
    #[must_use]
    pub fn with_to_client(mut self, connection_id: impl Into<String>) -> Self {
        self.to_client_id = Some(connection_id.into());
        self
    }

    /// Set the payload object.
    #[must_use]
    pub fn with_object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }
}

/// The unit exchanged across nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedEnvelope {
    /// Client-facing event name emitted on delivery.
    pub event: String,
    /// Event family.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Addressing and payload.
    pub data: EnvelopeData,
}

impl RoutedEnvelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(kind: MessageKind, event: impl Into<String>, data: EnvelopeData) -> Self {
        Self {
            event: event.into(),
            kind,
            data,
        }
    }

    /// The node this envelope is addressed to.
    #[must_use]
    pub fn target_node(&self) -> &str {
        &self.data.to_server_id
    }

    /// The recipient user.
    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.data.to_user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_kind_conversion() {
        assert_eq!(MessageKind::try_from(0x01), Ok(MessageKind::Timeline));
        assert_eq!(MessageKind::try_from(0x02), Ok(MessageKind::Action));
        assert_eq!(MessageKind::try_from(0x03), Ok(MessageKind::LiveVideo));
        assert_eq!(MessageKind::try_from(0x04), Ok(MessageKind::Direct));
        assert!(MessageKind::try_from(0x05).is_err());
        assert!(MessageKind::try_from(0x00).is_err());
    }

    #[test]
    fn test_envelope_construction() {
        let data = EnvelopeData::new("u1", "u2", "node-a", "node-b")
            .with_to_client("conn-9")
            .with_object(json!({"id": "p1"}));

        let envelope = RoutedEnvelope::new(MessageKind::Timeline, "timeline:update", data);

        assert_eq!(envelope.target_node(), "node-b");
        assert_eq!(envelope.recipient(), "u2");
        assert_eq!(envelope.data.to_client_id.as_deref(), Some("conn-9"));
        assert!(envelope.data.from_client_id.is_none());
        assert!(envelope.data.timestamp > 0);
    }
}
