// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdio JSON-RPC hub server: aggregates peers discovered via `fm-discovery`
//! and connected via `ConnectionManager`, exposing `instances_list`,
//! `instances_connect`, `instances_disconnect`, and `hub_<tool>` proxy
//! tools that forward to the bound (or explicitly named) peer instance.

use std::io::IsTerminal;
use std::sync::Arc;

use fm_core::{Clock, InstanceId, SessionId};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::connection::ConnectionManager;

/// A single stdio connection is treated as one session, since stdio mode
/// has exactly one client for the process's lifetime.
const STDIO_SESSION_ID: &str = "stdio";

/// If stdin/stdout are attached to a terminal rather than a pipe, prints
/// usage and returns `false`: stdio mode is meant to be driven by a parent
/// MCP client, not typed at interactively.
pub fn check_not_interactive() -> bool {
    if std::io::stdin().is_terminal() || std::io::stdout().is_terminal() {
        println!("fm-hub speaks newline-delimited JSON-RPC 2.0 on stdin/stdout.");
        println!("It is meant to be launched by an MCP-capable client, not run directly in a terminal.");
        return false;
    }
    true
}

/// Runs the stdio JSON-RPC loop until stdin closes. Each line is one
/// JSON-RPC request; each response is written as one JSON line to stdout.
pub async fn serve_stdio(manager: ConnectionManager, clock: Arc<dyn Clock>) {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let session = SessionId::new(STDIO_SESSION_ID);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdio read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<fm_mcp::RpcRequest>(&line) {
            Ok(req) => {
                let id = req.id.clone();
                match dispatch(&manager, clock.as_ref(), &session, req).await {
                    Ok(result) => fm_mcp::RpcResponse::ok(id, result),
                    Err(err) => fm_mcp::RpcResponse::err(id, err),
                }
            }
            Err(e) => fm_mcp::RpcResponse::err(
                None,
                fm_mcp::RpcError::new(fm_mcp::ErrorCode::ParseError, e.to_string()),
            ),
        };

        let Ok(mut body) = serde_json::to_vec(&response) else { continue };
        body.push(b'\n');
        if stdout.write_all(&body).await.is_err() || stdout.flush().await.is_err() {
            warn!("stdout write failed, stopping hub loop");
            break;
        }
    }
    info!("stdio hub loop exited");
}

async fn dispatch(
    manager: &ConnectionManager,
    clock: &dyn Clock,
    session: &SessionId,
    req: fm_mcp::RpcRequest,
) -> Result<Value, fm_mcp::RpcError> {
    match req.method.as_str() {
        "instances_list" => Ok(Value::Array(
            manager.list().into_iter().map(|c| serde_json::to_value(c).unwrap_or(Value::Null)).collect(),
        )),
        "instances_connect" => {
            let instance_id = req
                .params
                .get("instance_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| fm_mcp::RpcError::new(fm_mcp::ErrorCode::InvalidParams, "instance_id is required"))?;
            let instance_id = InstanceId::new(instance_id);
            manager
                .try_connect(&instance_id, clock.now_ms())
                .await
                .map_err(|e| (&e).into())?;
            manager.connect_session(session.clone(), instance_id);
            Ok(serde_json::json!({"connected": true}))
        }
        "instances_disconnect" => {
            manager.disconnect_session(session);
            Ok(serde_json::json!({"disconnected": true}))
        }
        method if method.starts_with("hub_") => proxy_call(manager, session, method, &req.params).await,
        other => Err(fm_mcp::RpcError::new(fm_mcp::ErrorCode::MethodNotFound, format!("unknown method: {other}"))),
    }
}

/// `hub_<tool>` proxies the underlying `<tool>` call to the resolved
/// instance's `/mcp` endpoint, returning its result verbatim.
async fn proxy_call(
    manager: &ConnectionManager,
    session: &SessionId,
    method: &str,
    params: &Value,
) -> Result<Value, fm_mcp::RpcError> {
    let tool_name = method.strip_prefix("hub_").unwrap_or(method);
    let explicit = params
        .get("instance_id")
        .and_then(|v| v.as_str())
        .map(InstanceId::new);

    let conn = manager
        .resolve_active(explicit.as_ref(), Some(session))
        .map_err(|e| (&e).into())?;

    let mut arguments = params.clone();
    if let Value::Object(map) = &mut arguments {
        map.remove("instance_id");
    }

    let request = fm_mcp::RpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(fm_mcp::RpcId::Number(1)),
        method: "tools/call".into(),
        params: serde_json::json!({"name": tool_name, "arguments": arguments}),
    };

    let url = format!("{}/mcp", conn.base_url());
    let resp = conn
        .client
        .post(&url)
        .json(&request)
        .send()
        .await
        .map_err(|e| fm_mcp::RpcError::new(fm_mcp::ErrorCode::Timeout, e.to_string()))?;

    let body: fm_mcp::RpcResponse = resp
        .json()
        .await
        .map_err(|e| fm_mcp::RpcError::new(fm_mcp::ErrorCode::InternalError, e.to_string()))?;

    match (body.result, body.error) {
        (Some(result), _) => Ok(result),
        (None, Some(err)) => Err(err),
        (None, None) => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_core::Instance;

    fn sample(id: &str) -> Instance {
        Instance {
            id: InstanceId::new(id),
            name: "demo".into(),
            directory: "/tmp".into(),
            port: 1,
            started_at_ms: 0,
            last_ping_ms: 0,
            process_info: fm_core::ProcessInfo { pid: 1, executable: "/bin/demo".into() },
            version: "0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn hub_tool_without_binding_is_not_connected() {
        let manager = ConnectionManager::new();
        manager.upsert_discovered(sample("i1"), 0);
        let session = SessionId::new(STDIO_SESSION_ID);
        let err = proxy_call(&manager, &session, "hub_scripts_list", &serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.code, fm_mcp::ErrorCode::NotConnected as i64);
    }

    #[tokio::test]
    async fn instances_list_reflects_discovered_connections() {
        let manager = ConnectionManager::new();
        manager.upsert_discovered(sample("i1"), 0);
        let session = SessionId::new(STDIO_SESSION_ID);
        let clock: Arc<dyn Clock> = Arc::new(fm_core::FakeClock::default());
        let req = fm_mcp::RpcRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "instances_list".into(),
            params: Value::Null,
        };
        let result = dispatch(&manager, clock.as_ref(), &session, req).await.unwrap();
        assert_eq!(result.as_array().unwrap().len(), 1);
    }
}
