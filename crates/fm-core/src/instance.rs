// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance announcement record written to the discovery directory.

use serde::{Deserialize, Serialize};

use crate::id::InstanceId;

/// OS process info about the instance's own daemon, for liveness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub executable: String,
}

/// One running foreman instance, as announced to the discovery directory.
///
/// Timestamps are epoch-milliseconds rather than RFC3339 strings, for
/// internal consistency with the rest of the codebase's `Clock` abstraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub directory: String,
    pub port: u16,
    #[serde(rename = "startedAt")]
    pub started_at_ms: i64,
    #[serde(rename = "lastPing")]
    pub last_ping_ms: i64,
    #[serde(rename = "processInfo")]
    pub process_info: ProcessInfo,
    pub version: String,
}

impl Instance {
    /// `name-<16 hex chars>`, falling back to `name-<unix-nanos>` if the RNG
    /// source is unavailable.
    pub fn generate_id(name: &str, random_hex16: Option<&str>, fallback_nanos: u128) -> InstanceId {
        match random_hex16 {
            Some(hex) => InstanceId::new(format!("{name}-{hex}")),
            None => InstanceId::new(format!("{name}-{fallback_nanos}")),
        }
    }
}
