// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance MCP tool handlers, backed by the shared Supervisor and
//! LogStore. Registered into a `fm_mcp::ToolRegistry` at startup.

use std::sync::Arc;

use async_trait::async_trait;
use fm_core::{Error, LogLevel, ProcessId, ProcessState, Result};
use fm_mcp::ToolHandler;
use fm_storage::{warn_on_lag, LogQuery, LogStore, StreamedLog};
use fm_supervisor::Supervisor;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast;

fn process_state_json(state: &ProcessState) -> Value {
    json!({
        "id": state.id.as_str(),
        "name": state.config.name,
        "script": state.config.command,
        "status": state.status.to_string(),
        "pid": state.pid,
        "startedAt": state.started_at_ms,
        "endedAt": state.exited_at_ms,
        "exitCode": state.exit_code,
    })
}

fn log_entry_json(entry: &fm_core::LogEntry) -> Value {
    json!({
        "id": entry.id,
        "processId": entry.process_id.as_str(),
        "source": format!("{:?}", entry.source).to_lowercase(),
        "level": format!("{:?}", entry.level).to_lowercase(),
        "content": entry.content,
        "timestamp": entry.timestamp_ms,
        "isError": entry.is_error(),
    })
}

pub struct ScriptsListTool {
    pub supervisor: Arc<Supervisor>,
}

#[async_trait]
impl ToolHandler for ScriptsListTool {
    fn name(&self) -> &str {
        "scripts_list"
    }
    fn description(&self) -> &str {
        "Lists every tracked process and its current status."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn call(&self, _arguments: Value) -> Result<Value> {
        let processes: Vec<Value> = self.supervisor.get_all_processes().iter().map(|p| process_state_json(p)).collect();
        Ok(json!({ "processes": processes }))
    }
}

pub struct ScriptsRunTool {
    pub supervisor: Arc<Supervisor>,
    pub working_dir: String,
}

#[async_trait]
impl ToolHandler for ScriptsRunTool {
    fn name(&self) -> &str {
        "scripts_run"
    }
    fn description(&self) -> &str {
        "Starts a named script (or an arbitrary command line) as a tracked process."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "name": {"type": "string"}, "command": {"type": "string"} },
            "required": ["name"],
        })
    }
    async fn call(&self, arguments: Value) -> Result<Value> {
        let name = arguments
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidArgument("name is required".into()))?;

        let id = match arguments.get("command").and_then(|v| v.as_str()) {
            Some(command) => {
                self.supervisor
                    .start_command(name, command, &self.working_dir, Default::default())
                    .await?
            }
            None => self.supervisor.start_script(name, &self.working_dir).await?,
        };
        Ok(json!({ "processId": id.as_str() }))
    }
}

pub struct ScriptsStopTool {
    pub supervisor: Arc<Supervisor>,
}

#[async_trait]
impl ToolHandler for ScriptsStopTool {
    fn name(&self) -> &str {
        "scripts_stop"
    }
    fn description(&self) -> &str {
        "Stops a tracked process by id, terminating its process tree."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "processId": {"type": "string"} },
            "required": ["processId"],
        })
    }
    async fn call(&self, arguments: Value) -> Result<Value> {
        let process_id = arguments
            .get("processId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidArgument("processId is required".into()))?;
        self.supervisor.stop_process(&ProcessId::new(process_id)).await?;
        Ok(json!({ "stopped": true }))
    }
}

pub struct ScriptsStatusTool {
    pub supervisor: Arc<Supervisor>,
}

#[async_trait]
impl ToolHandler for ScriptsStatusTool {
    fn name(&self) -> &str {
        "scripts_status"
    }
    fn description(&self) -> &str {
        "Returns the status of one process by id, or every process if omitted."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"processId": {"type": "string"}}})
    }
    async fn call(&self, arguments: Value) -> Result<Value> {
        match arguments.get("processId").and_then(|v| v.as_str()) {
            Some(process_id) => {
                let state = self
                    .supervisor
                    .get_process(&ProcessId::new(process_id))
                    .ok_or_else(|| Error::NotFound(process_id.to_string()))?;
                Ok(process_state_json(&state))
            }
            None => {
                let processes: Vec<Value> =
                    self.supervisor.get_all_processes().iter().map(|p| process_state_json(p)).collect();
                Ok(json!({ "processes": processes }))
            }
        }
    }
}

pub struct LogsSearchTool {
    pub log_store: Arc<LogStore>,
}

fn parse_level(value: &Value) -> Option<LogLevel> {
    match value.get("level").and_then(|v| v.as_str()) {
        Some("error") => Some(LogLevel::Error),
        Some("warn") => Some(LogLevel::Warn),
        Some("info") => Some(LogLevel::Info),
        Some("debug") => Some(LogLevel::Debug),
        _ => None,
    }
}

#[async_trait]
impl ToolHandler for LogsSearchTool {
    fn name(&self) -> &str {
        "logs_search"
    }
    fn description(&self) -> &str {
        "Searches the log ring for entries matching a regex and/or level, newest-first."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "processId": {"type": "string"},
                "regex": {"type": "string"},
                "level": {"type": "string", "enum": ["error", "warn", "info", "debug"]},
                "sinceId": {"type": "integer"},
                "limit": {"type": "integer"},
            },
        })
    }
    async fn call(&self, arguments: Value) -> Result<Value> {
        let query = LogQuery {
            process_id: arguments.get("processId").and_then(|v| v.as_str()).map(ProcessId::new),
            level: parse_level(&arguments),
            since_id: arguments.get("sinceId").and_then(|v| v.as_u64()),
            regex: arguments.get("regex").and_then(|v| v.as_str()).map(String::from),
            limit: arguments.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize),
        };
        let entries = self.log_store.search(&query)?;
        Ok(json!({ "entries": entries.iter().map(log_entry_json).collect::<Vec<_>>() }))
    }
}

pub struct LogsStreamTool {
    pub log_store: Arc<LogStore>,
}

#[async_trait]
impl ToolHandler for LogsStreamTool {
    fn name(&self) -> &str {
        "logs_stream"
    }
    fn description(&self) -> &str {
        "Returns the current backlog for a process, optionally waiting briefly \
         for new lines to arrive (`follow: true`). Clients that want an \
         indefinite live feed should open an SSE session and request \
         `resources/subscribe` instead of polling this tool in a loop."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "processId": {"type": "string"},
                "level": {"type": "string", "enum": ["error", "warn", "info", "debug"]},
                "limit": {"type": "integer"},
                "follow": {"type": "boolean"},
                "followMs": {"type": "integer"},
            },
        })
    }
    async fn call(&self, arguments: Value) -> Result<Value> {
        let process_id = arguments.get("processId").and_then(|v| v.as_str()).map(ProcessId::new);
        let level = parse_level(&arguments);
        let query = LogQuery {
            process_id: process_id.clone(),
            level,
            since_id: None,
            regex: None,
            limit: arguments.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize),
        };
        let follow = arguments.get("follow").and_then(|v| v.as_bool()).unwrap_or(false);
        let (backlog, receiver) = self.log_store.stream(&query, follow)?;

        let mut entries: Vec<StreamedLog> = backlog.into_iter().map(StreamedLog::Backlog).collect();
        if let Some(receiver) = receiver {
            let follow_ms = arguments.get("followMs").and_then(|v| v.as_u64()).unwrap_or(FOLLOW_DEFAULT_MS);
            collect_live(receiver, Duration::from_millis(follow_ms), process_id.as_ref(), level, &mut entries).await;
        }

        Ok(json!({ "entries": entries.iter().map(streamed_log_json).collect::<Vec<_>>() }))
    }
}

const FOLLOW_DEFAULT_MS: u64 = 2_000;

/// Drains `receiver` into `entries` until `timeout` elapses, applying the
/// same process/level filters `search` would. `since_id`/`regex` are not
/// re-applied here: they scope the backlog, not what counts as "new".
async fn collect_live(
    mut receiver: broadcast::Receiver<fm_core::LogEntry>,
    timeout: Duration,
    process_id: Option<&ProcessId>,
    level: Option<LogLevel>,
    entries: &mut Vec<StreamedLog>,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, receiver.recv()).await {
            Ok(Ok(entry)) => {
                let matches_process = process_id.map(|pid| pid == &entry.process_id).unwrap_or(true);
                let matches_level = level.map(|l| l == entry.level).unwrap_or(true);
                if matches_process && matches_level {
                    entries.push(StreamedLog::Live(entry));
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => warn_on_lag(skipped),
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return,
        }
    }
}

fn streamed_log_json(item: &StreamedLog) -> Value {
    match item {
        StreamedLog::Backlog(entry) => {
            let mut v = log_entry_json(entry);
            v["live"] = json!(false);
            v
        }
        StreamedLog::Live(entry) => {
            let mut v = log_entry_json(entry);
            v["live"] = json!(true);
            v
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_core::{EventBus, SequentialIdGen, SystemClock};
    use std::collections::HashMap;

    fn supervisor() -> Arc<Supervisor> {
        let event_bus = EventBus::new();
        Arc::new(Supervisor::new(
            HashMap::new(),
            Arc::new(LogStore::new(Arc::new(SystemClock), event_bus.clone())),
            event_bus,
            Arc::new(SystemClock),
            Arc::new(SequentialIdGen::new("p")),
        ))
    }

    #[tokio::test]
    async fn scripts_run_then_list_reflects_new_process() {
        let supervisor = supervisor();
        let run = ScriptsRunTool { supervisor: supervisor.clone(), working_dir: "/tmp".into() };
        let result = run.call(json!({"name": "hello", "command": "echo hi"})).await.unwrap();
        assert!(result.get("processId").is_some());

        let list = ScriptsListTool { supervisor };
        let result = list.call(json!({})).await.unwrap();
        assert_eq!(result["processes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scripts_run_missing_name_is_invalid_argument() {
        let run = ScriptsRunTool { supervisor: supervisor(), working_dir: "/tmp".into() };
        let err = run.call(json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn scripts_status_unknown_process_is_not_found() {
        let status = ScriptsStatusTool { supervisor: supervisor() };
        let err = status.call(json!({"processId": "nope"})).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn logs_search_filters_by_regex() {
        let log_store = Arc::new(LogStore::new(Arc::new(SystemClock), EventBus::new()));
        log_store.add(ProcessId::new("p1"), fm_core::LogSource::Stdout, "listening on :3000".into(), LogLevel::Info);
        let tool = LogsSearchTool { log_store };
        let result = tool.call(json!({"regex": "3000"})).await.unwrap();
        assert_eq!(result["entries"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn logs_stream_follow_picks_up_a_line_published_after_the_call_starts() {
        let log_store = Arc::new(LogStore::new(Arc::new(SystemClock), EventBus::new()));
        let pid = ProcessId::new("p1");
        log_store.add(pid.clone(), fm_core::LogSource::Stdout, "backlog line".into(), LogLevel::Info);

        let tool = LogsStreamTool { log_store: log_store.clone() };
        let call = tool.call(json!({"processId": "p1", "follow": true, "followMs": 200}));

        let producer = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            log_store.add(pid, fm_core::LogSource::Stdout, "live line".into(), LogLevel::Info);
        };
        let (result, _) = tokio::join!(call, producer);
        let entries = result.unwrap()["entries"].as_array().unwrap().clone();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0]["live"].as_bool().unwrap());
        assert!(entries[1]["live"].as_bool().unwrap());
    }
}
