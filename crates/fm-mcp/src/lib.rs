// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Transport-agnostic core of an MCP Streamable HTTP server: JSON-RPC 2.0
//! envelopes, a tool/resource registry, session lifecycle, and the Axum
//! router wiring them together.

pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use protocol::{ErrorCode, RpcError, RpcId, RpcRequest, RpcResponse};
pub use registry::{ResourceHandler, ResourceRegistry, ToolHandler, ToolRegistry};
pub use server::{router, ServerState};
pub use session::{SessionHandle, SessionStore};
