//! HTTP and WebSocket gateway server.

use crate::error::GatewayError;
use crate::handlers::{register_all, HandlerContext};
use crate::http;
use crate::methods::MethodRegistry;
use crate::rpc;
use crate::state::GatewayState;
use crate::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use freesail_core::catalog::Catalog;
use freesail_core::config::{BindMode, Config};
use freesail_core::paths;
use freesail_core::protocol::SESSION_HEADER;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Origins trusted when bound to loopback.
const LOCAL_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://127.0.0.1",
    "https://localhost",
    "https://127.0.0.1",
];

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
    pub methods: Arc<MethodRegistry>,
}

/// The Freesail gateway server.
pub struct Gateway {
    app: AppState,
}

impl Gateway {
    /// Create a gateway with every agent method registered and the configured
    /// catalogs preloaded.
    pub async fn new(config: Config) -> Self {
        let state = Arc::new(GatewayState::new(config));
        let methods = Arc::new(MethodRegistry::new());
        register_all(&methods, HandlerContext::new(state.clone())).await;

        let gateway = Self {
            app: AppState {
                gateway: state,
                methods,
            },
        };
        gateway.preload_catalogs().await;
        gateway
    }

    /// Gateway state.
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.app.gateway
    }

    /// Get the method registry for registering handlers.
    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.app.methods
    }

    async fn preload_catalogs(&self) {
        let config = &self.app.gateway.config.gateway;
        let dir = match &config.catalogs_dir {
            Some(dir) => dir.clone(),
            None => match paths::catalogs_dir() {
                Ok(dir) if dir.is_dir() => dir,
                _ => return,
            },
        };

        match Catalog::load_dir(&dir) {
            Ok(catalogs) => {
                let count = self.app.gateway.preload_catalogs(catalogs).await;
                info!("Preloaded {} catalog(s) from {}", count, dir.display());
            }
            Err(e) => warn!("Failed to read catalogs from {}: {}", dir.display(), e),
        }
    }

    /// Run the gateway until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_address();
        let config = &self.app.gateway.config.gateway;

        if config.bind != BindMode::Loopback {
            warn!("Gateway binding to {}; it is reachable from the network", addr);
        }

        let sweeper = self.app.gateway.spawn_sweeper();
        let app = self.router();

        info!("Starting gateway server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Io)?;

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        sweeper.abort();
        served.map_err(|e| GatewayError::Internal(e.to_string()))?;
        info!("Gateway stopped");
        Ok(())
    }

    /// Create the Axum router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/stream", get(http::stream_handler))
            .route("/message", post(http::message_handler))
            .route("/catalogs", post(http::catalogs_handler))
            .route("/ping", post(http::ping_handler))
            .route("/health", get(http::health_handler))
            .route("/rpc", post(rpc_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.app.clone())
            .layer(TraceLayer::new_for_http());

        let config = &self.app.gateway.config.gateway;
        if config.cors {
            router = router.layer(create_cors_layer(config.bind));
        }

        router
    }

    /// Get the bind address.
    fn bind_address(&self) -> SocketAddr {
        let config = &self.app.gateway.config.gateway;
        let ip = match config.bind {
            BindMode::Loopback => [127, 0, 0, 1],
            BindMode::Lan => [0, 0, 0, 0],
        };

        SocketAddr::from((ip, config.port))
    }
}

/// CORS for browser clients. Loopback binds only admit local origins.
fn create_cors_layer(bind: BindMode) -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, session_header.clone()])
        .expose_headers([session_header])
        .max_age(std::time::Duration::from_secs(3600));

    match bind {
        BindMode::Loopback => layer.allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(is_local_origin)
                    .unwrap_or(false)
            },
        )),
        BindMode::Lan => layer.allow_origin(Any),
    }
}

fn is_local_origin(origin: &str) -> bool {
    LOCAL_ORIGINS.iter().any(|allowed| {
        origin
            .strip_prefix(allowed)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

/// `POST /rpc`: one JSON-RPC request per HTTP request.
async fn rpc_handler(State(app): State<AppState>, body: String) -> Response {
    match rpc::dispatch(&app.methods, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// WebSocket upgrade handler for agents.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app.methods, addr))
}

/// Serve JSON-RPC over a WebSocket connection.
async fn handle_socket(socket: WebSocket, methods: Arc<MethodRegistry>, remote_addr: SocketAddr) {
    info!("Agent connected from {}", remote_addr);

    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Some(response) = rpc::dispatch(&methods, &text).await else {
                    continue;
                };
                let payload = match serde_json::to_string(&response) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to serialize response: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(payload)).await {
                    error!("Failed to send response: {}", e);
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Agent {} closed connection", remote_addr);
                break;
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    info!("Agent disconnected: {}", remote_addr);
}
