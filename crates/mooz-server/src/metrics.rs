//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render `/metrics`. Fails if a
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Client connections opened total (counter).
pub const HUB_CONNECTIONS_TOTAL: &str = "hub_connections_total";
/// Client disconnections total (counter, labels: reason).
pub const HUB_DISCONNECTIONS_TOTAL: &str = "hub_disconnections_total";
/// Connected clients (gauge).
pub const HUB_CONNECTIONS_ACTIVE: &str = "hub_connections_active";
/// Messages queued for delivery total (counter).
pub const HUB_MESSAGES_ROUTED_TOTAL: &str = "hub_messages_routed_total";
/// Addressed messages whose recipient was not registered (counter).
pub const HUB_ROUTING_MISSES_TOTAL: &str = "hub_routing_misses_total";
/// Messages dropped on a full or closed queue (counter).
pub const HUB_DROPPED_MESSAGES_TOTAL: &str = "hub_dropped_messages_total";
/// Clients dropped for unanswered probes (counter).
pub const HUB_HEARTBEAT_TIMEOUTS_TOTAL: &str = "hub_heartbeat_timeouts_total";
/// Session lifetime seconds (histogram).
pub const HUB_SESSION_DURATION_SECONDS: &str = "hub_session_duration_seconds";
