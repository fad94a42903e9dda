// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A URL observed in a process's log output.

use serde::{Deserialize, Serialize};

use crate::id::ProcessId;

/// A URL detected in log content, labeled with a best-effort guess at what
/// it serves (dev server name, or the owning process's name as a fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlMapping {
    pub process_id: ProcessId,
    pub url: String,
    /// Set once a reverse proxy has taken over serving `url`, via
    /// `LogStore::update_proxy_url`.
    pub proxy_url: Option<String>,
    pub label: String,
    pub detected_at_ms: i64,
}
