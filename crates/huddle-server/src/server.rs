use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use huddle_core::SessionId;
use huddle_telemetry::MetricsRecorder;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::event_bridge;
use crate::handlers::{self, HandlerState};
use crate::hub::SessionHub;
use crate::shutdown::ShutdownCoordinator;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub heartbeat_interval: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/sessions", get(list_sessions).post(mint_session))
        .route("/sessions/{id}", get(get_session))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and spawn the server with its background tasks.
pub async fn start(
    config: ServerConfig,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, ServerError> {
    config.validate()?;

    let clients = Arc::new(ClientRegistry::new(
        config.max_send_queue,
        config.client_timeout(),
    ));
    let hub = Arc::new(SessionHub::new(
        config.broadcast_capacity,
        Arc::clone(&clients),
        Arc::clone(&metrics),
    ));
    let handler_state = Arc::new(HandlerState::new(
        Arc::clone(&hub),
        Arc::clone(&clients),
        Arc::clone(&metrics),
    ));
    let shutdown = ShutdownCoordinator::new();

    let bridge = event_bridge::create_bridge(
        Arc::clone(&clients),
        Arc::clone(&metrics),
        hub.subscribe(),
    );
    let cleanup = spawn_cleanup_task(
        Arc::clone(&handler_state),
        config.cleanup_interval(),
        shutdown.token(),
    );

    let router = build_router(AppState {
        handler_state,
        heartbeat_interval: config.heartbeat_interval(),
    });
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "huddle server started");

    let token = shutdown.token();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        shutdown,
        server,
        bridge,
        cleanup,
    })
}

/// Handle returned by [`start`]. Keeps the background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: ShutdownCoordinator,
    server: JoinHandle<()>,
    bridge: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for the server tasks to finish.
    pub async fn shutdown(self) {
        // The bridge only ends when the hub is dropped, so it is aborted
        // rather than awaited.
        self.bridge.abort();
        self.shutdown
            .graceful_shutdown(vec![self.server, self.cleanup], None)
            .await;
        tracing::info!("huddle server stopped");
    }
}

/// Periodically disconnect clients that stopped answering pings.
fn spawn_cleanup_task(
    state: Arc<HandlerState>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => break,
            }
            for client_id in state.clients.dead_clients() {
                tracing::info!(client_id = %client_id, "removing unresponsive client");
                handlers::disconnect(&state, &client_id);
            }
        }
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.handler_state.clients.register();
    state.handler_state.record_client_count();
    tracing::info!(client_id = %client_id, "client connected");

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.handler_state,
        state.heartbeat_interval,
    )
    .await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.handler_state.hub.session_count(),
        "clients": state.handler_state.clients.count(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.handler_state.hub.snapshots())
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.handler_state.hub.snapshot(&SessionId::from_raw(id)) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "SESSION_NOT_FOUND" })),
        )
            .into_response(),
    }
}

/// Mint a fresh id. The session itself only exists once someone joins it.
async fn mint_session() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "sessionId": SessionId::new() })),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.handler_state.metrics.snapshot();
    Json(serde_json::json!({
        "totalCount": metrics.len(),
        "metrics": metrics,
    }))
}
