//! Connection handlers for the Parley server.
//!
//! A connection names itself in the upgrade request (`/ws?name=alice`). The
//! name is reserved before the upgrade completes, so a taken or invalid name
//! is refused with a plain HTTP error and never becomes a WebSocket.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MetricsObserver};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parley_core::{RegistryError, Router as ParleyRouter, Session, SessionError};
use parley_protocol::{Encoding, Envelope};
use parley_transport::websocket::{self, Outbox};
use parley_transport::Connection;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The message router.
    pub router: Arc<ParleyRouter>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            router: Arc::new(ParleyRouter::with_config(config.router_config())),
            config,
        }
    }
}

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Display name to register.
    pub name: Option<String>,
    /// Outbound encoding (`json` or `msgpack`); the configured default when absent.
    pub encoding: Option<String>,
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/rooms", get(rooms_handler))
        .with_state(state)
}

/// Serve `app` on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops abnormally.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let path = config.transport.websocket_path.clone();
    let state = Arc::new(AppState::new(config));

    // Bind and serve
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}?name=<name>", addr, path);

    serve(listener, build_app(state)).await
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.router.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": stats.client_count,
        "rooms": stats.room_count,
    }))
}

/// List rooms and their members.
async fn rooms_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let rooms = state.router.rooms();
    let mut names = rooms.names();
    names.sort();

    let listing: Vec<_> = names
        .into_iter()
        .map(|name| {
            let members: Vec<String> = rooms
                .members(&name)
                .unwrap_or_default()
                .iter()
                .map(|client| client.name().to_string())
                .collect();
            serde_json::json!({ "name": name, "members": members })
        })
        .collect();

    Json(serde_json::json!({ "rooms": listing }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(name) = params.name else {
        debug!(remote = %remote, "Upgrade without a name");
        return reject(
            StatusCode::BAD_REQUEST,
            "missing_name",
            Envelope::system("A name is required to connect"),
        );
    };

    let encoding = match requested_encoding(params.encoding.as_deref()) {
        Ok(encoding) => encoding,
        Err(response) => {
            debug!(remote = %remote, "Upgrade with unknown encoding");
            return response;
        }
    };

    let ws_config = state.config.websocket_config(encoding);
    let (connection, outbox) = websocket::outbox(&ws_config, Some(remote.to_string()));
    let connection: Arc<dyn Connection> = Arc::new(connection);

    let session = match Session::connect(Arc::clone(&state.router), &name, connection) {
        Ok(session) => {
            session.with_observer(Arc::new(MetricsObserver::new(Arc::clone(&state.router))))
        }
        Err(e) => {
            let (status, reason) = rejection_status(&e);
            info!(client = %name, remote = %remote, reason, "Connection refused");
            return reject(status, reason, e.to_envelope());
        }
    };

    // A failed upgrade drops the closure, and with it the session.
    ws.on_failed_upgrade(move |e| warn!(remote = %remote, error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_websocket(socket, outbox, session, state))
}

/// Drive an upgraded connection until its session ends.
async fn handle_websocket(
    socket: WebSocket,
    outbox: Outbox,
    session: Session,
    state: Arc<AppState>,
) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();
    let started = Instant::now();

    info!(
        client = %session.client().name(),
        id = %session.client().id(),
        "WebSocket connected"
    );
    metrics::set_router_stats(&state.router.stats());

    let mut incoming = websocket::attach(socket, outbox);
    let summary = session.run(&mut incoming).await;

    metrics::record_session(&summary, started.elapsed().as_secs_f64());
    metrics::set_router_stats(&state.router.stats());

    info!(
        client = %summary.name,
        reason = summary.reason.label(),
        direct = summary.stats.direct,
        broadcast = summary.stats.broadcast,
        "WebSocket disconnected"
    );
}

/// Parse the `encoding` query parameter, refusing unknown values.
fn requested_encoding(raw: Option<&str>) -> Result<Option<Encoding>, Response> {
    raw.map(str::parse::<Encoding>).transpose().map_err(|e| {
        reject(
            StatusCode::BAD_REQUEST,
            "invalid_encoding",
            Envelope::system(format!("Invalid encoding: {e}")),
        )
    })
}

fn rejection_status(error: &SessionError) -> (StatusCode, &'static str) {
    match error {
        SessionError::Rejected(RegistryError::NameTaken(_)) => (StatusCode::CONFLICT, "name_taken"),
        SessionError::Rejected(RegistryError::InvalidName(_)) => {
            (StatusCode::BAD_REQUEST, "invalid_name")
        }
        SessionError::Rejected(RegistryError::Full) => {
            (StatusCode::SERVICE_UNAVAILABLE, "server_full")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

fn reject(status: StatusCode, reason: &'static str, envelope: Envelope) -> Response {
    metrics::record_rejection(reason);
    (status, Json(envelope)).into_response()
}
