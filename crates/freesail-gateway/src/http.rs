//! Client-facing HTTP endpoints.
//!
//! A client opens `GET /stream` and reads newline-delimited JSON frames for
//! as long as the response body stays open. Upstream traffic arrives on
//! separate POSTs that carry the session id in the `X-Session-Id` header.

use crate::error::GatewayError;
use crate::output::{ChannelOutput, OutputChannel};
use crate::server::AppState;
use crate::state::GatewayState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use freesail_core::catalog::Catalog;
use freesail_core::protocol::{OperationError, UpstreamMessage, SESSION_HEADER};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Query string of `GET /stream`.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Comma-separated catalog ids the client supports.
    #[serde(default)]
    pub catalogs: Option<String>,
}

impl StreamQuery {
    fn capabilities(&self) -> Option<Vec<String>> {
        let ids: Vec<String> = self
            .catalogs
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        Some(ids)
    }
}

/// Runs the disconnect path when the client's stream body is dropped.
struct StreamGuard {
    state: Arc<GatewayState>,
    session_id: String,
    keepalive: JoinHandle<()>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.keepalive.abort();
        let state = self.state.clone();
        let session_id = std::mem::take(&mut self.session_id);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if state.disconnect_session(&session_id).await {
                    info!("Client stream closed: {}", session_id);
                }
            });
        }
    }
}

/// `GET /stream`: open a session and stream its frames.
pub async fn stream_handler(
    State(app): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let state = app.gateway;
    let (output, rx) = ChannelOutput::new();
    let output = Arc::new(output);

    let session_id = match state
        .create_session(output.clone(), query.capabilities())
        .await
    {
        Ok(id) => id,
        Err(GatewayError::Capacity(msg)) => {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, &msg);
        }
        Err(e) => {
            warn!("Failed to open client session: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let keepalive = spawn_keepalive(output, state.config.session.keepalive());
    let guard = StreamGuard {
        state,
        session_id: session_id.clone(),
        keepalive,
    };

    let mut response = Body::from_stream(frame_stream(rx, guard)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        headers.insert(SESSION_HEADER, value);
    }
    response
}

fn frame_stream(
    rx: UnboundedReceiver<String>,
    guard: StreamGuard,
) -> impl futures::Stream<Item = Result<String, Infallible>> {
    futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok(frame), (rx, guard)))
    })
}

/// Write a blank line periodically so idle connections stay open.
fn spawn_keepalive(output: Arc<ChannelOutput>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if output.send("\n").is_err() {
                break;
            }
        }
    })
}

/// `POST /message`: accept an upstream action or error.
pub async fn message_handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<UpstreamMessage>,
) -> Response {
    let session_id = session_header(&headers);
    debug!(
        "Upstream message for surface '{}' (session {:?})",
        message.surface_id(),
        session_id
    );

    match app
        .gateway
        .enqueue_upstream(session_id.as_deref(), message)
        .await
    {
        Ok(session_id) => Json(json!({"success": true, "sessionId": session_id})).into_response(),
        Err(e) => operation_failure(StatusCode::NOT_FOUND, &e),
    }
}

/// Body of `POST /catalogs`.
#[derive(Debug, Deserialize)]
pub struct RegisterCatalogs {
    pub catalogs: Vec<Catalog>,
}

/// `POST /catalogs`: register catalogs for the calling session.
pub async fn catalogs_handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterCatalogs>,
) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return error_response(StatusCode::BAD_REQUEST, "missing X-Session-Id header");
    };

    match app.gateway.register_catalogs(&session_id, body.catalogs).await {
        Ok(ids) => Json(json!({"success": true, "catalogIds": ids})).into_response(),
        Err(e) => operation_failure(StatusCode::NOT_FOUND, &e),
    }
}

/// `POST /ping`: refresh the calling session's activity time.
pub async fn ping_handler(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return error_response(StatusCode::BAD_REQUEST, "missing X-Session-Id header");
    };

    if app.gateway.touch(&session_id).await {
        Json(json!({"success": true})).into_response()
    } else {
        operation_failure(
            StatusCode::NOT_FOUND,
            &OperationError::session_not_found(&session_id),
        )
    }
}

/// `GET /health`.
pub async fn health_handler(State(app): State<AppState>) -> Json<Value> {
    let (sessions, surfaces) = app.gateway.counts().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": sessions,
        "surfaces": surfaces,
        "uptimeSecs": app.gateway.uptime_secs(),
        "stats": app.gateway.stats(),
    }))
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn operation_failure(status: StatusCode, err: &OperationError) -> Response {
    (status, Json(err.to_result())).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": {"message": message}}))).into_response()
}
