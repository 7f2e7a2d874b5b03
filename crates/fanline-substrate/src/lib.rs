//! # fanline-substrate
//!
//! Substrate abstraction layer for the fanline routing engine.
//!
//! The substrate is the shared ordered key-value and pub/sub store every
//! node talks to: sorted sets back the bounded timelines, plain sets back
//! the broadcast-topic subscriber lists, and pub/sub channels carry
//! cross-node envelopes. All mutations go through atomic pipelined batches
//! so concurrent writers against the same key cannot interleave partially.
//!
//! Two backends ship with the crate:
//!
//! - **memory** - single-process backend for tests, development, and
//!   single-node deployments
//! - **redis** - the production backend, one `Batch` per `MULTI`/`EXEC`
//!   pipeline round trip
//!
//! ```rust,ignore
//! use fanline_substrate::{Batch, Substrate};
//!
//! async fn insert(store: &dyn Substrate) {
//!     let batch = Batch::new()
//!         .sorted_insert("timeline:u1", 1700000000000.0, "p1")
//!         .sorted_trim("timeline:u1", 999);
//!     store.apply(batch).await.unwrap();
//! }
//! ```

pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use traits::{Batch, Command, ScoredMember, Subscription, Substrate, SubstrateError};

#[cfg(feature = "memory")]
pub use memory::{MemoryStats, MemorySubstrate};

#[cfg(feature = "redis")]
pub use redis::RedisSubstrate;
