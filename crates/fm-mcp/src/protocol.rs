// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 envelope types.

use fm_core::Error as CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP Streamable HTTP protocol version this server speaks.
pub const PROTOCOL_VERSION: &str = "2025-11-25";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Option<RpcId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<RpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Option<RpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<RpcId>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Standard JSON-RPC 2.0 error codes plus the server-defined range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    NotFound = -32001,
    AlreadyRunning = -32002,
    NotConnected = -32003,
    Timeout = -32004,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i64,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&CoreError> for RpcError {
    fn from(err: &CoreError) -> Self {
        let code = match err {
            CoreError::NotFound(_) => ErrorCode::NotFound,
            CoreError::AlreadyRunning(_) => ErrorCode::AlreadyRunning,
            CoreError::NotConnected(_) => ErrorCode::NotConnected,
            CoreError::InvalidArgument(_) => ErrorCode::InvalidParams,
            CoreError::Timeout(_) => ErrorCode::Timeout,
            CoreError::StartFailure(_) | CoreError::Transport(_) | CoreError::Internal(_) | CoreError::Io(_) => {
                ErrorCode::InternalError
            }
        };
        RpcError::new(code, err.to_string()).with_data(serde_json::json!({ "kind": err.kind() }))
    }
}
