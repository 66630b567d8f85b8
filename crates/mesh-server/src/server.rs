//! `MeshServer`: axum router exposing the peer WebSocket endpoint and
//! `/health`, plus the node's shutdown sequence.
//!
//! ```text
//!   shutdown(listener)
//!     1. cancel token      ─► axum stops accepting upgrades
//!     2. node.shutdown()   ─► every registered connection closed
//!     3. join listener     ─► bounded by the grace period
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::{Json, Response};
use axum::routing::get;
use mesh_core::TransportError;
use mesh_settings::TransportSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::health::{self, HealthResponse};
use crate::node::Node;
use crate::transport::{Connection, WsConnection};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Node that takes ownership of upgraded sockets.
    pub node: Arc<Node>,
    /// When the server started.
    pub start_time: Instant,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

/// Default wait for the listener task during [`MeshServer::shutdown`].
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The inbound side of a mesh node.
pub struct MeshServer {
    node: Arc<Node>,
    transport: TransportSettings,
    cancel: CancellationToken,
    start_time: Instant,
}

impl MeshServer {
    /// Create a server feeding accepted peers into `node`.
    pub fn new(node: Arc<Node>, transport: TransportSettings) -> Self {
        Self {
            node,
            transport,
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            node: Arc::clone(&self.node),
            start_time: self.start_time,
            max_message_size: self.transport.max_message_size,
        };

        Router::new()
            .route(&self.transport.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `addr` and serve until the shutdown token is cancelled.
    pub async fn listen(&self, addr: &str) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener)
    }

    /// Serve on an already bound listener.
    pub fn serve(&self, listener: TcpListener) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let local_addr = listener.local_addr()?;
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.cancel.clone();

        info!(%local_addr, ws_path = %self.transport.ws_path, "mesh node listening");
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "listener failed");
            }
            info!("listener stopped");
        });
        Ok((local_addr, handle))
    }

    /// The node behind this server.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop accepting peers, close every registered connection, then wait up
    /// to `grace` for the listener task.
    ///
    /// The listener stops first so no upgrade lands after the node's
    /// connections were closed.
    pub async fn shutdown(&self, listener: JoinHandle<()>, grace: Duration) {
        let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        info!(grace_ms, "stopping listener");
        self.cancel.cancel();
        self.node.shutdown();

        match tokio::time::timeout(grace, listener).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "listener task failed"),
            Err(_) => warn!(?grace, "listener did not stop in time"),
        }
    }
}

/// GET {ws_path}: upgrade and hand the socket to the node.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let on_failure = Arc::clone(&state.node);
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(move |e: axum::Error| {
            let _ = on_failure.accept_incoming(Err(TransportError::Handshake(e.to_string())));
        })
        .on_upgrade(move |socket| async move {
            let conn: Arc<dyn Connection> =
                Arc::new(WsConnection::from_axum(socket, remote.to_string()));
            let _ = state.node.accept_incoming(Ok(conn));
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.node.connection_count(),
    ))
}
