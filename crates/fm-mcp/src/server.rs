// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Axum Streamable HTTP transport: `POST /mcp` dispatches one JSON-RPC
//! call (returning either a plain JSON body or an SSE stream), `GET /mcp`
//! opens a long-lived server push stream, `DELETE /mcp` ends a session.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fm_core::SessionId;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::protocol::{ErrorCode, RpcError, RpcRequest, RpcResponse, PROTOCOL_VERSION};
use crate::registry::{ResourceRegistry, ToolRegistry};
use crate::session::{SessionHandle, SessionStore};

/// Server push / SSE heartbeat interval, per the Streamable HTTP transport
/// keepalive convention.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A stream with no new events for this long is closed server-side.
pub const IDLE_STREAM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Name advertised in `initialize`'s `serverInfo`.
pub const SERVER_NAME: &str = "foreman-mcp";

const MCP_SESSION_HEADER: &str = "mcp-session-id";

pub struct ServerState {
    pub tools: ToolRegistry,
    pub resources: ResourceRegistry,
    pub sessions: SessionStore,
    port: AtomicU16,
    running: AtomicBool,
}

impl ServerState {
    pub fn new(tools: ToolRegistry, resources: ResourceRegistry) -> Arc<Self> {
        Arc::new(Self {
            tools,
            resources,
            sessions: SessionStore::new(),
            port: AtomicU16::new(0),
            running: AtomicBool::new(false),
        })
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/mcp", post(handle_post).get(handle_get).delete(handle_delete))
        .route("/health", get(handle_health))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the router to `preferred_port`, retrying on successive ports up to
/// `max_attempts` times on `AddrInUse`. Idempotent: a second call while
/// already running returns the existing port without rebinding.
pub async fn serve(
    state: Arc<ServerState>,
    preferred_port: u16,
    max_attempts: u16,
) -> std::io::Result<(u16, tokio::task::JoinHandle<()>)> {
    if state.is_running() {
        return Ok((state.port(), tokio::spawn(std::future::ready(()))));
    }

    let mut port = preferred_port;
    let listener = loop {
        match TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await {
            Ok(listener) => break listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && port < preferred_port + max_attempts => {
                warn!(port, "port in use, retrying on next port");
                port += 1;
            }
            Err(e) => return Err(e),
        }
    };

    state.port.store(port, Ordering::Release);
    state.running.store(true, Ordering::Release);
    info!(port, "mcp server listening");

    let app = router(state.clone());
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
        state.running.store(false, Ordering::Release);
    });
    Ok((port, handle))
}

async fn handle_health(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "running": state.is_running(),
        "sessions": state.sessions.len(),
    }))
}

async fn handle_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(req): Json<RpcRequest>,
) -> Response {
    let wants_stream = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    let session = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| state.sessions.get(&SessionId::new(raw)));

    let response = dispatch(&state, req, session).await;

    if wants_stream {
        let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(4);
        let body = serde_json::to_string(&response).unwrap_or_default();
        let _ = tx.send(Ok(SseEvent::default().event("message").data(body))).await;
        let stream = ReceiverStream::new(rx);
        Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL)).into_response()
    } else {
        Json(response).into_response()
    }
}

async fn handle_get(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    let session = match headers.get(MCP_SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(raw) => state.sessions.get(&SessionId::new(raw)),
        None => None,
    };
    let Some(session) = session.or_else(|| Some(state.sessions.create())) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(32);
    let cancel = session.cancel.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut idle_deadline = tokio::time::sleep(IDLE_STREAM_TIMEOUT);
        tokio::pin!(idle_deadline);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut idle_deadline => break,
                _ = ticker.tick() => {
                    if tx.send(Ok(SseEvent::default().event("ping").data("{}"))).await.is_err() {
                        break;
                    }
                    idle_deadline.as_mut().reset(tokio::time::Instant::now() + IDLE_STREAM_TIMEOUT);
                }
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).into_response()
}

async fn handle_delete(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> StatusCode {
    if let Some(raw) = headers.get(MCP_SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        state.sessions.remove(&SessionId::new(raw));
    }
    StatusCode::NO_CONTENT
}

async fn dispatch(state: &ServerState, req: RpcRequest, session: Option<SessionHandle>) -> RpcResponse {
    match req.method.as_str() {
        "initialize" => RpcResponse::ok(
            req.id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                "capabilities": {
                    "tools": {},
                    "resources": { "subscribe": true },
                },
            }),
        ),
        "resources/subscribe" => {
            let uri = req.params.get("uri").and_then(|v| v.as_str()).unwrap_or_default();
            if uri.is_empty() {
                return RpcResponse::err(
                    req.id,
                    RpcError::new(ErrorCode::InvalidParams, "resources/subscribe requires a uri"),
                );
            }
            match session {
                Some(session) => {
                    session.subscribe(uri);
                    RpcResponse::ok(req.id, serde_json::json!({ "subscribed": uri }))
                }
                None => RpcResponse::err(
                    req.id,
                    RpcError::new(ErrorCode::InvalidRequest, "resources/subscribe requires an mcp-session-id header"),
                ),
            }
        }
        "tools/list" => RpcResponse::ok(req.id, serde_json::json!({ "tools": state.tools.list() })),
        "resources/list" => RpcResponse::ok(req.id, serde_json::json!({ "resources": state.resources.list() })),
        "resources/read" => {
            let uri = req.params.get("uri").and_then(|v| v.as_str()).unwrap_or_default();
            match state.resources.get(uri) {
                Some(resource) => match resource.read().await {
                    Ok(value) => RpcResponse::ok(req.id, value),
                    Err(e) => RpcResponse::err(req.id, (&e).into()),
                },
                None => RpcResponse::err(
                    req.id,
                    RpcError::new(ErrorCode::NotFound, format!("no such resource: {uri}")),
                ),
            }
        }
        "tools/call" => {
            let name = req.params.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            let arguments = req.params.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
            match state.tools.get(name) {
                Some(tool) => match tool.call(arguments).await {
                    Ok(value) => RpcResponse::ok(req.id, value),
                    Err(e) => RpcResponse::err(req.id, (&e).into()),
                },
                None => RpcResponse::err(
                    req.id,
                    RpcError::new(ErrorCode::MethodNotFound, format!("no such tool: {name}")),
                ),
            }
        }
        "ping" => RpcResponse::ok(req.id, serde_json::json!({})),
        other => RpcResponse::err(
            req.id,
            RpcError::new(ErrorCode::MethodNotFound, format!("unknown method: {other}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RpcId;

    fn state() -> Arc<ServerState> {
        ServerState::new(ToolRegistry::new(), ResourceRegistry::new())
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let state = state();
        let req = RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(RpcId::Number(1)),
            method: "ping".into(),
            params: serde_json::Value::Null,
        };
        let resp = dispatch(&state, req, None).await;
        assert_eq!(resp.result, Some(serde_json::json!({})));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let state = state();
        let req = RpcRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "nope".into(),
            params: serde_json::Value::Null,
        };
        let resp = dispatch(&state, req, None).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::MethodNotFound as i64);
    }

    #[tokio::test]
    async fn initialize_advertises_protocol_version_and_name() {
        let state = state();
        let req = RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(RpcId::Number(1)),
            method: "initialize".into(),
            params: serde_json::Value::Null,
        };
        let resp = dispatch(&state, req, None).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn resources_subscribe_without_session_is_invalid_request() {
        let state = state();
        let req = RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(RpcId::Number(1)),
            method: "resources/subscribe".into(),
            params: serde_json::json!({ "uri": "logs://p1" }),
        };
        let resp = dispatch(&state, req, None).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::InvalidRequest as i64);
    }

    #[tokio::test]
    async fn resources_subscribe_with_session_records_subscription() {
        let state = state();
        let session = state.sessions.create();
        let req = RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(RpcId::Number(1)),
            method: "resources/subscribe".into(),
            params: serde_json::json!({ "uri": "logs://p1" }),
        };
        let resp = dispatch(&state, req, Some(session.clone())).await;
        assert!(resp.error.is_none());
        assert_eq!(session.subscriptions(), vec!["logs://p1".to_string()]);
    }

    #[tokio::test]
    async fn server_binds_and_reports_port() {
        let state = state();
        let (port, handle) = serve(state.clone(), 0, 1).await.unwrap();
        assert!(state.is_running());
        assert_eq!(state.port(), port);
        handle.abort();
    }
}
