//! `HubServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::assets;
use crate::config::{HubConfig, ServerConfig};
use crate::health::{self, HealthResponse};
use crate::hub::transport::split_socket;
use crate::hub::{
    ClientRegistry, ClientSession, MessageReader, MessageRouter, MessageWriter, SessionEnd,
};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::tls;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Delivery over the client registry.
    pub router: MessageRouter,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Running session tasks.
    pub sessions: TaskTracker,
    /// Per-session tuning.
    pub hub: HubConfig,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay hub server.
pub struct HubServer {
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    sessions: TaskTracker,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl HubServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            sessions: TaskTracker::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Expose `/metrics` rendered from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn state(&self) -> AppState {
        AppState {
            router: MessageRouter::new(self.registry.clone()),
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
            hub: self.config.hub.clone(),
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = self.state();
        let mut app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler));
        if self.metrics.is_some() {
            app = app.route("/metrics", get(metrics_handler));
        }
        let mut app = app.with_state(state);

        if let Some(service) = self.config.assets_dir.as_deref().and_then(assets::spa_service) {
            app = app.fallback_service(service);
        }

        app.layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in the background, over TLS
    /// when a certificate is configured.
    ///
    /// Fails if the address cannot be bound or the certificate and key
    /// cannot be loaded.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.normalized_bind_addr()).await?;
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.token();
        let server = match &self.config.tls {
            Some(cert) => {
                let rustls = tls::load(cert).await?;
                let listener = listener.into_std()?;
                info!(addr = %local_addr, tls = true, "mooz hub listening");
                tokio::spawn(async move {
                    if let Err(e) = tls::serve(listener, rustls, app, token).await {
                        warn!(error = %e, "server error");
                    }
                })
            }
            None => {
                info!(addr = %local_addr, tls = false, "mooz hub listening");
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app)
                        .with_graceful_shutdown(token.cancelled_owned())
                        .await
                    {
                        warn!(error = %e, "server error");
                    }
                })
            }
        };

        Ok(ServerHandle {
            local_addr,
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
            timeout: self.config.shutdown_timeout,
            server,
        })
    }

    /// Get the client registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    sessions: TaskTracker,
    timeout: Duration,
    server: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections, end every session, and wait for them to
    /// finish. Returns `false` if the shutdown timeout elapsed first.
    ///
    /// Sessions and the listener share one deadline.
    pub async fn shutdown(self) -> bool {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let drained = self
            .shutdown
            .graceful_shutdown(&self.sessions, Some(self.timeout))
            .await;
        match tokio::time::timeout_at(deadline, self.server).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "server task failed"),
            Err(_) => warn!("server did not stop within {:?}", self.timeout),
        }
        info!(drained, "mooz hub stopped");
        drained
    }
}

/// GET /ws: upgrade and run a client session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let (reader, writer) = split_socket(socket);
            let end = accept_session(state, reader, writer).await;
            debug!(?end, "session finished");
        })
}

/// Run a session for an upgraded connection unless shutdown has begun.
///
/// The tracker slot is taken before the check, so a drain that starts
/// afterwards waits for this session.
async fn accept_session<R, W>(state: AppState, reader: R, writer: W) -> Option<SessionEnd>
where
    R: MessageReader,
    W: MessageWriter,
{
    let sessions = state.sessions.clone();
    sessions
        .track_future(async move {
            if state.shutdown.is_shutting_down() {
                debug!("upgrade finished after shutdown began, closing");
                return None;
            }
            let session = ClientSession::new(state.router, state.hub, state.shutdown.token());
            Some(session.run(reader, writer).await)
        })
        .await
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.router.registry().len().await;
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_shutting_down(),
        connections,
        state.sessions.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => metrics::render(&handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
