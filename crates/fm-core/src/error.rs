// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy used across every foreman component.

use thiserror::Error;

/// Errors surfaced by the supervisor, log store, discovery, and hub.
///
/// Variants map 1:1 onto the abstract error kinds named in the component
/// design: each is mapped to a JSON-RPC error code at the MCP transport
/// boundary and to a human-readable line on `fm-cli`'s stderr for fatal
/// startup failures only.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to start process: {0}")]
    StartFailure(String),

    #[error("process already running: {0}")]
    AlreadyRunning(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable short tag for logging and for the JSON-RPC `data.kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::StartFailure(_) => "start_failure",
            Error::AlreadyRunning(_) => "already_running",
            Error::NotConnected(_) => "not_connected",
            Error::Timeout(_) => "timeout",
            Error::Transport(_) => "transport",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::AlreadyRunning("x".into()).kind(), "already_running");
        assert_eq!(Error::NotConnected("x".into()).kind(), "not_connected");
    }

    #[test]
    fn display_includes_context() {
        let err = Error::StartFailure("spawn failed: no such file".into());
        assert!(err.to_string().contains("spawn failed"));
    }
}
