//! Server assembly: shared state, the axum router, the WebSocket handshake,
//! and the listener with graceful shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use gridcast_identity::IdentityService;
use gridcast_store::GridStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{HealthResponse, health_check};
use crate::limiter::{RateLimiter, run_sweeper};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::SessionRegistry;
use crate::websocket::session::run_session;

/// Everything the handlers share.
pub struct AppState {
    /// Server configuration, fixed at startup.
    pub config: ServerConfig,
    /// Grid persistence backend.
    pub store: Arc<dyn GridStore>,
    /// Identity/color resolution backend.
    pub identity: Arc<dyn IdentityService>,
    /// Live session set.
    pub registry: Arc<SessionRegistry>,
    /// Update fan-out engine.
    pub broadcaster: Arc<Broadcaster>,
    /// Per-identity request limiter.
    pub limiter: Arc<RateLimiter>,
    /// Shutdown coordination for sessions and background tasks.
    pub shutdown: ShutdownCoordinator,
    /// Prometheus render handle, absent when no recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// Server start time, for uptime reporting.
    pub start_time: Instant,
}

/// The gridcast server: owns the shared state and runs the listener.
pub struct GridServer {
    state: Arc<AppState>,
}

impl GridServer {
    /// Assemble a server from its backends.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn GridStore>,
        identity: Arc<dyn IdentityService>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry)));
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(config.rate_limit_window_secs),
            config.rate_limit_max_requests,
        ));
        let state = Arc::new(AppState {
            config,
            store,
            identity,
            registry,
            broadcaster,
            limiter,
            shutdown: ShutdownCoordinator::new(),
            metrics,
            start_time: Instant::now(),
        });
        Self { state }
    }

    /// The shared state, for callers that wire signals or inspect counters.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Build the router: the WebSocket endpoint plus health and metrics.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(self) -> io::Result<()> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener until the shutdown token fires.
    pub async fn serve_on(self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "gridcast server listening");

        let sweeper = tokio::spawn(run_sweeper(
            Arc::clone(&self.state.limiter),
            Duration::from_secs(self.state.config.limiter_sweep_interval_secs),
            self.state.shutdown.token(),
        ));

        let token = self.state.shutdown.token();
        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;

        let _ = sweeper.await;
        info!("gridcast server stopped");
        result
    }
}

/// Query parameters of the WebSocket handshake.
#[derive(Debug, Deserialize)]
struct WsQuery {
    uid: Option<String>,
}

/// The handshake: identity first, capacity second, then the upgrade.
///
/// A request that fails here is answered with a plain HTTP error and never
/// becomes a session.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let uid = match query.uid {
        Some(uid) if !uid.is_empty() => uid,
        _ => {
            warn!("handshake without uid rejected");
            return handshake_error(StatusCode::BAD_REQUEST, "Data not valid");
        }
    };

    // Best-effort cap: the session registers only after the upgrade, so
    // concurrent handshakes can briefly overshoot the limit.
    if state.registry.connection_count() >= state.config.max_connections {
        warn!(
            uid = %uid,
            max = state.config.max_connections,
            "handshake rejected, at capacity"
        );
        return handshake_error(StatusCode::SERVICE_UNAVAILABLE, "Server at capacity");
    }

    match state.identity.resolve_color(&uid).await {
        Ok(Some(color)) => {
            ws.on_upgrade(move |socket| run_session(socket, uid, color, state))
        }
        Ok(None) => {
            warn!(uid = %uid, "handshake rejected, unknown identity");
            handshake_error(StatusCode::UNAUTHORIZED, "Unauthorized")
        }
        Err(e) => {
            error!(uid = %uid, error = %e, "identity lookup failed");
            handshake_error(StatusCode::INTERNAL_SERVER_ERROR, "Can't get color info")
        }
    }
}

fn handshake_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": { "message": message } }))).into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(health_check(
        state.start_time,
        state.registry.connection_count(),
    ))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
