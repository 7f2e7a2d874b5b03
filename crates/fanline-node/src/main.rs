//! # fanline node
//!
//! Standalone relay node for the fanline routing engine.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (in-memory substrate)
//! fanline
//!
//! # Run against a shared redis substrate (requires the `redis` feature)
//! FANLINE_SUBSTRATE=redis FANLINE_REDIS_URL=redis://cache:6379 fanline
//! ```
//!
//! The node subscribes its dial-up channel and serves routed deliveries.
//! Transport termination (WebSocket etc.) is the embedding application's
//! concern; this binary wires a logging emitter in its place.

mod config;
mod metrics;

use anyhow::Result;
use async_trait::async_trait;
use fanline_core::{EmitError, EngineBuilder, LocalEmitter};
use fanline_core::{MemoryAudience, MemoryContent, MemoryPresence};
use fanline_substrate::Substrate;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, SubstrateBackend};

/// Emitter used when no transport layer is attached: logs every delivery
/// and feeds the delivery counters.
struct LogEmitter;

#[async_trait]
impl LocalEmitter for LogEmitter {
    async fn emit(
        &self,
        connection_id: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), EmitError> {
        tracing::info!(connection = %connection_id, event = %event, %payload, "Delivery");
        metrics::record_delivery(event);
        Ok(())
    }
}

async fn build_substrate(config: &Config) -> Result<Arc<dyn Substrate>> {
    if config.substrate.backend == SubstrateBackend::Memory {
        return Ok(Arc::new(fanline_substrate::MemorySubstrate::new()));
    }

    #[cfg(feature = "redis")]
    {
        let substrate =
            fanline_substrate::RedisSubstrate::connect(&config.substrate.redis_url).await?;
        Ok(Arc::new(substrate))
    }
    #[cfg(not(feature = "redis"))]
    {
        anyhow::bail!("Substrate backend 'redis' requested but this build lacks the redis feature")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let substrate = build_substrate(&config).await?;

    let mut engine = EngineBuilder::new(
        substrate,
        Arc::new(MemoryPresence::new()),
        Arc::new(MemoryAudience::new()),
        Arc::new(MemoryContent::new()),
        Arc::new(LogEmitter),
    )
    .with_chunk_size(config.fanout.chunk_size)
    .build();

    tracing::info!("Starting fanline node {}", engine.node_id());

    let subscribed = engine.start().await;
    metrics::set_relay_subscribed(subscribed);
    if !subscribed {
        tracing::error!("Relay channel did not come up; serving local traffic only");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
