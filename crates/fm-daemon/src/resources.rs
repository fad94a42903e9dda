// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only MCP resources. Unlike tools, resources are registered once at
//! startup by URI, so these expose aggregate views rather than one resource
//! per dynamically-spawned process; per-process detail is available through
//! the `scripts_status`/`logs_search` tools.

use std::sync::Arc;

use async_trait::async_trait;
use fm_core::Result;
use fm_mcp::ResourceHandler;
use fm_storage::{LogQuery, LogStore};
use fm_supervisor::Supervisor;
use serde_json::{json, Value};

pub struct ProcessesResource {
    pub supervisor: Arc<Supervisor>,
}

#[async_trait]
impl ResourceHandler for ProcessesResource {
    fn uri(&self) -> &str {
        "processes://all"
    }
    fn description(&self) -> &str {
        "Every tracked process and its current status."
    }
    async fn read(&self) -> Result<Value> {
        let processes: Vec<Value> = self
            .supervisor
            .get_all_processes()
            .iter()
            .map(|p| {
                json!({
                    "id": p.id.as_str(),
                    "name": p.config.name,
                    "status": p.status.to_string(),
                    "pid": p.pid,
                })
            })
            .collect();
        Ok(json!({ "processes": processes }))
    }
}

const RECENT_LOGS_LIMIT: usize = 200;

pub struct RecentLogsResource {
    pub log_store: Arc<LogStore>,
}

#[async_trait]
impl ResourceHandler for RecentLogsResource {
    fn uri(&self) -> &str {
        "logs://recent"
    }
    fn description(&self) -> &str {
        "The most recent log lines across every tracked process, newest-first."
    }
    async fn read(&self) -> Result<Value> {
        let query = LogQuery { limit: Some(RECENT_LOGS_LIMIT), ..Default::default() };
        let entries = self.log_store.search(&query)?;
        let entries: Vec<Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "processId": e.process_id.as_str(),
                    "level": format!("{:?}", e.level).to_lowercase(),
                    "content": e.content,
                    "timestamp": e.timestamp_ms,
                })
            })
            .collect();
        Ok(json!({ "entries": entries }))
    }
}
