//! # fanline-core
//!
//! Core routing and fanout machinery for the fanline engine.
//!
//! A fleet of stateful connection-handling instances shares one substrate.
//! When an event for user B is produced on one instance, this crate looks
//! up where B is connected and delivers it there - locally through the
//! held connection, or remotely through the owning node's inbound channel.
//!
//! Building blocks:
//!
//! - **NodeId** - process-lifetime node identity
//! - **TimelineStore** - bounded per-user timelines + broadcast-topic subscriber sets
//! - **FanoutOrchestrator** - audience chunking for fanout/fanin
//! - **Relay** - per-node dial-up channel over the substrate's pub/sub
//! - **Gateway** - per-recipient local-vs-remote delivery decisions
//! - **Engine** - composition root wiring the above together
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌───────────────┐
//! │ Producer │───▶│ Orchestrator │───▶│ TimelineStore │
//! └──────────┘    └──────────────┘    └───────┬───────┘
//!                                     notices │
//!                                             ▼
//!                  ┌─────────┐        ┌───────────────┐
//!                  │  Relay  │◀──────▶│    Gateway    │
//!                  └────┬────┘ remote └───────┬───────┘
//!                       │                     │ local
//!                       ▼                     ▼
//!                 other nodes          held connection
//! ```

pub mod content;
pub mod engine;
pub mod gateway;
pub mod identity;
pub mod orchestrator;
pub mod presence;
pub mod relay;
pub mod timeline;

pub use content::{
    AudienceError, AudienceResolver, AuthorProfile, ContentItem, ContentProvider, MemoryAudience,
    MemoryContent,
};
pub use engine::{Engine, EngineBuilder};
pub use gateway::{
    BroadcastOutcome, Delivery, EmitError, Gateway, GatewayError, LocalEmitter, RoutedEvent,
};
pub use identity::NodeId;
pub use orchestrator::{DistributeError, FanoutOrchestrator, CHUNK_SIZE};
pub use presence::{MemoryPresence, PresenceDirectory, PresenceError, PresenceRecord};
pub use relay::{EnvelopeDispatch, Relay, RelaySender, RelayState};
pub use timeline::{Direction, FanoutNotice, TimelineEntry, TimelineStore, Topic, TIMELINE_CAP};
