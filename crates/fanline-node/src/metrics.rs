//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const DELIVERIES_TOTAL: &str = "fanline_deliveries_total";
    pub const RELAY_SUBSCRIBED: &str = "fanline_relay_subscribed";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Total events emitted on locally held connections"
    );
    metrics::describe_gauge!(
        names::RELAY_SUBSCRIBED,
        "Whether this node's relay channel is subscribed (1) or not (0)"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a local delivery.
pub fn record_delivery(event: &str) {
    counter!(names::DELIVERIES_TOTAL, "event" => event.to_string()).increment(1);
}

/// Update the relay subscription gauge.
pub fn set_relay_subscribed(subscribed: bool) {
    gauge!(names::RELAY_SUBSCRIBED).set(if subscribed { 1.0 } else { 0.0 });
}
