//! `RelayServer`: the axum HTTP and WebSocket surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use relay_core::{ConnectionId, MessageStore, StoredMessage};

use crate::auth::{AuthError, Authenticator, Handshake, Identity, TrustedHeaderAuthenticator};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::metrics;
use crate::router::MessageRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::transport;
use crate::websocket::connection::ClientConnection;
use crate::websocket::session::run_connection;

/// Headroom above `max_message_size` for axum's own frame limit, so that
/// moderately oversized frames reach the session and close it cleanly.
const FRAME_SLACK: usize = 16 * 1024;

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 200;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    hub: Hub,
    router: Arc<MessageRouter>,
    store: Arc<dyn MessageStore>,
    auth: Arc<dyn Authenticator>,
    config: Arc<ServerConfig>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    live: Arc<AtomicUsize>,
    sessions: TaskTracker,
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Create a server persisting through `store`.
    ///
    /// Starts the room registry, so this must run inside a tokio runtime.
    /// Identities come from the configured trusted header until
    /// [`with_authenticator`](Self::with_authenticator) replaces it.
    pub fn new(config: ServerConfig, store: Arc<dyn MessageStore>) -> Self {
        let (hub, _registry) = Hub::spawn(config.hub_command_buffer);
        let router = Arc::new(MessageRouter::new(
            hub.clone(),
            Arc::clone(&store),
            config.connection.max_message_size,
        ));
        let auth = Arc::new(TrustedHeaderAuthenticator::from_name(&config.identity_header));
        Self {
            state: AppState {
                hub,
                router,
                store,
                auth,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics: None,
                live: Arc::new(AtomicUsize::new(0)),
                sessions: TaskTracker::new(),
            },
        }
    }

    /// Replace the handshake authenticator.
    #[must_use]
    pub fn with_authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.state.auth = auth;
        self
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/rooms/{room_id}", get(ws_handler))
            .route("/rooms/{room_id}/messages", get(history_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server stopped with error");
            }
        });
        info!(addr = %local_addr, "relay listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting, close every session with reason `Shutdown` and wait
    /// for them up to the configured timeout.
    pub async fn shutdown(&self) -> bool {
        self.state
            .shutdown
            .graceful_shutdown(&self.state.sessions, self.state.config.shutdown_timeout)
            .await
    }

    /// Room registry handle.
    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Live WebSocket sessions.
    pub fn connection_count(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }
}

/// A reserved connection slot, released on drop.
struct Slot(Arc<AtomicUsize>);

impl Slot {
    fn reserve(live: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        live.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(Arc::clone(live)))
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn authenticate(state: &AppState, room_id: &str, headers: &HeaderMap) -> Result<Identity, Response> {
    state
        .auth
        .authenticate(&Handshake { room_id, headers })
        .map_err(|e| {
            warn!(room_id, error = %e, "handshake rejected");
            let status = match e {
                AuthError::InvalidRoom => StatusCode::BAD_REQUEST,
                AuthError::MissingIdentity(_) | AuthError::InvalidIdentity => StatusCode::UNAUTHORIZED,
            };
            (status, e.to_string()).into_response()
        })
}

/// GET /ws/rooms/{room_id}
///
/// Identity is checked before the upgrade itself, so an unauthenticated
/// client gets `401` rather than an upgrade error.
async fn ws_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let identity = match authenticate(&state, &room_id, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let Some(slot) = Slot::reserve(&state.live, state.config.max_connections) else {
        warn!(max = state.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let limit = state.config.connection.max_message_size + FRAME_SLACK;
    let sessions = state.sessions.clone();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| sessions.track_future(serve_socket(socket, identity, state, slot)))
}

async fn serve_socket(socket: WebSocket, identity: Identity, state: AppState, _slot: Slot) {
    let (sink, source) = transport::ws::split(socket);
    let (tx, rx) = mpsc::channel(state.config.connection.outbound_queue_capacity);
    let connection = Arc::new(ClientConnection::new(
        ConnectionId::new(),
        identity.room_id,
        identity.sender_id,
        tx,
        state.shutdown.child_token(),
    ));
    let _ = run_connection(
        connection,
        rx,
        source,
        sink,
        state.hub.clone(),
        Arc::clone(&state.router),
        state.config.connection.clone(),
    )
    .await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.stats().await.ok();
    Json(health::health_check(
        state.start_time,
        state.live.load(Ordering::Acquire),
        stats,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map_or_else(String::new, metrics::render);
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
    before: Option<i64>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    messages: Vec<StoredMessage>,
}

/// GET /rooms/{room_id}/messages
async fn history_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Response {
    let identity = match authenticate(&state, &room_id, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match state.store.history(&identity.room_id, limit, query.before).await {
        Ok(messages) => Json(HistoryResponse { messages }).into_response(),
        Err(e) => {
            warn!(room_id = %identity.room_id, error = %e, "history read failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use relay_core::{RoomId, SenderId};
    use tower::ServiceExt;

    use crate::router::test_support::RecordingStore;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default(), Arc::new(RecordingStore::default()))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.connection_count(), 0);
        assert!(!server.shutdown_coordinator().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_rooms() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["rooms"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_is_text() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = make_server().with_metrics(handle);
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn ws_without_identity_is_unauthorized() {
        let server = make_server();
        let req = Request::builder()
            .uri("/ws/rooms/order-42")
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn history_requires_identity() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/rooms/order-42/messages")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn history_reads_from_store() {
        let store = Arc::new(RecordingStore::default());
        let _ = store
            .save(&RoomId::from("order-42"), &SenderId::from("a"), "hi", Utc::now())
            .await
            .unwrap();
        let server = RelayServer::new(ServerConfig::default(), store);
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/rooms/order-42/messages?limit=10")
                    .header("x-relay-sender", "a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_json(resp).await["messages"].is_array());
    }

    #[tokio::test]
    async fn history_store_failure_is_unavailable() {
        let server =
            RelayServer::new(ServerConfig::default(), Arc::new(RecordingStore::failing()));
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/rooms/order-42/messages")
                    .header("x-relay-sender", "a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn slots_are_bounded_and_released() {
        let live = Arc::new(AtomicUsize::new(0));
        let first = Slot::reserve(&live, 2).unwrap();
        let second = Slot::reserve(&live, 2).unwrap();
        assert!(Slot::reserve(&live, 2).is_none());
        drop(first);
        assert_eq!(live.load(Ordering::Acquire), 1);
        let _third = Slot::reserve(&live, 2).unwrap();
        drop(second);
        assert_eq!(live.load(Ordering::Acquire), 1);
    }
}
