//! # fanline-protocol
//!
//! Wire envelope definitions for the fanline cross-node routing engine.
//!
//! This crate defines the envelope exchanged between nodes over the
//! substrate's pub/sub channels, the closed set of routed event families,
//! the MessagePack codec, and the node-channel naming scheme.
//!
//! ## Envelope anatomy
//!
//! - `event` - the client-facing event name emitted on delivery
//! - `kind` - which event family the envelope belongs to
//! - `data` - addressing (user/connection/node on both ends) plus payload
//!
//! ## Example
//!
//! ```rust
//! use fanline_protocol::{codec, EnvelopeData, MessageKind, RoutedEnvelope};
//!
//! let data = EnvelopeData::new("u1", "u2", "node-a", "node-b")
//!     .with_object(serde_json::json!({"post": "p1"}));
//! let envelope = RoutedEnvelope::new(MessageKind::Timeline, "timeline:update", data);
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(envelope, decoded);
//! ```

pub mod channel;
pub mod codec;
pub mod envelope;

pub use channel::{node_channel, parse_node_channel, validate_node_id, NODE_CHANNEL_PREFIX};
pub use codec::{decode, encode, ProtocolError};
pub use envelope::{EnvelopeData, MessageKind, RoutedEnvelope};
