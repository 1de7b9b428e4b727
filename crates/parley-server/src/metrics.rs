//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::{MessageKind, RouteError, Router, RouterStats, SessionObserver, SessionSummary};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "parley_connections_rejected_total";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "parley_delivery_failures_total";
    pub const SESSIONS_CLOSED: &str = "parley_sessions_closed_total";
    pub const SESSION_SECONDS: &str = "parley_session_duration_seconds";
    pub const CLIENTS_ACTIVE: &str = "parley_clients_active";
    pub const ROOMS_ACTIVE: &str = "parley_rooms_active";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of upgraded connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused before upgrade"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages routed");
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Room broadcasts that missed at least one member"
    );
    metrics::describe_counter!(names::SESSIONS_CLOSED, "Sessions closed, by reason");
    metrics::describe_histogram!(names::SESSION_SECONDS, "Session duration in seconds");
    metrics::describe_gauge!(names::CLIENTS_ACTIVE, "Current number of registered clients");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of rooms");

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

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection refused before upgrade.
pub fn record_rejection(reason: &'static str) {
    counter!(names::CONNECTIONS_REJECTED, "reason" => reason).increment(1);
}

/// Record a routed message.
pub fn record_message(kind: MessageKind) {
    counter!(names::MESSAGES_TOTAL, "kind" => kind.label()).increment(1);
}

/// Record a broadcast that missed at least one member.
pub fn record_delivery_failure() {
    counter!(names::DELIVERY_FAILURES_TOTAL).increment(1);
}

/// Record a finished session.
pub fn record_session(summary: &SessionSummary, seconds: f64) {
    counter!(names::SESSIONS_CLOSED, "reason" => summary.reason.label()).increment(1);
    histogram!(names::SESSION_SECONDS).record(seconds);
}

/// Update registry gauges.
pub fn set_router_stats(stats: &RouterStats) {
    gauge!(names::CLIENTS_ACTIVE).set(stats.client_count as f64);
    gauge!(names::ROOMS_ACTIVE).set(stats.room_count as f64);
}

/// Session observer that records each routed message as it happens.
pub struct MetricsObserver {
    router: Arc<Router>,
}

impl MetricsObserver {
    /// Create an observer reading registry gauges from `router`.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl SessionObserver for MetricsObserver {
    fn message_routed(&self, kind: MessageKind) {
        record_message(kind);
        if kind == MessageKind::Membership {
            set_router_stats(&self.router.stats());
        }
    }

    fn delivery_incomplete(&self, _error: &RouteError) {
        record_delivery_failure();
    }
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{Client, CloseReason, SessionStats};
    use parley_transport::{memory, Connection};

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; recording must be a no-op
        let _guard = ConnectionMetricsGuard::new();
    }

    #[test]
    fn test_record_session() {
        let summary = SessionSummary {
            name: "alice".to_string(),
            reason: CloseReason::PeerClosed,
            stats: SessionStats {
                direct: 2,
                ..SessionStats::default()
            },
        };
        record_session(&summary, 1.5);
        record_rejection("name_taken");
    }

    #[test]
    fn test_observer_records_each_message() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let router = Arc::new(Router::new());
        let (conn, _incoming, _peer) = memory::pair();
        let conn: Arc<dyn Connection> = Arc::new(conn);
        let alice = Arc::new(Client::new("alice", conn));
        router.rooms().join("lobby", &alice).unwrap();

        let observer = MetricsObserver::new(Arc::clone(&router));
        metrics::with_local_recorder(&recorder, || {
            observer.message_routed(MessageKind::Direct);
            observer.message_routed(MessageKind::Direct);
            observer.message_routed(MessageKind::Membership);
            observer.delivery_incomplete(&RouteError::RoomLimitReached);
        });

        let rendered = handle.render();
        assert!(rendered.contains("parley_messages_total{kind=\"direct\"} 2"));
        assert!(rendered.contains("parley_messages_total{kind=\"membership\"} 1"));
        assert!(rendered.contains("parley_delivery_failures_total 1"));
        assert!(rendered.contains("parley_rooms_active 1"));
    }
}
