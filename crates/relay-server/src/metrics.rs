//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if another recorder was installed first.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Connections admitted (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Live connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Connections closed (counter, labels: reason).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Messages accepted by the router (counter).
pub const MESSAGES_ROUTED_TOTAL: &str = "relay_messages_routed_total";
/// Failed message saves (counter).
pub const PERSIST_FAILURES_TOTAL: &str = "relay_persist_failures_total";
/// Members evicted during a broadcast (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Inbound frames that did not parse (counter).
pub const MALFORMED_FRAMES_TOTAL: &str = "relay_malformed_frames_total";
/// Rooms with at least one member (gauge).
pub const ROOMS_ACTIVE: &str = "relay_rooms_active";
/// Connection lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
