// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process Supervisor: `startScript`/`startCommand`/`stopProcess` and the
//! concurrent registry backing `getProcess`/`getAllProcesses`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use dashmap::DashMap;
use fm_adapters::{cleanup, env::forced_tty_env, treekill};
use fm_core::{
    Clock, Error, Event, EventBus, EventKind, IdGen, ProcessConfig, ProcessId, ProcessState,
    Result,
};
use fm_storage::LogStore;
use serde_json::json;
use tokio::process::Command;
use tracing::{info, warn};

use crate::callbacks::LogCallback;
use crate::handle::ProcessHandle;

pub struct Supervisor {
    processes: DashMap<ProcessId, Arc<ProcessHandle>>,
    scripts: HashMap<String, String>,
    log_store: Arc<LogStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
}

impl Supervisor {
    pub fn new(
        scripts: HashMap<String, String>,
        log_store: Arc<LogStore>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGen>,
    ) -> Self {
        Self {
            processes: DashMap::new(),
            scripts,
            log_store,
            event_bus,
            clock,
            id_gen,
        }
    }

    /// Resolves `name` against the configured script table and spawns it.
    pub async fn start_script(&self, name: &str, working_dir: &str) -> Result<ProcessId> {
        let command = self
            .scripts
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no script named {name}")))?;
        self.start_command(name, &command, working_dir, HashMap::new())
            .await
    }

    /// Spawns an arbitrary command line, not required to be a named script.
    pub async fn start_command(
        &self,
        name: &str,
        command: &str,
        working_dir: &str,
        env: HashMap<String, String>,
    ) -> Result<ProcessId> {
        if self.processes.iter().any(|entry| {
            let state = entry.value().snapshot();
            state.config.name == name && !state.is_terminal()
        }) {
            return Err(Error::AlreadyRunning(name.to_string()));
        }

        let id = ProcessId::new(self.id_gen.next());
        let config = ProcessConfig {
            name: name.to_string(),
            command: command.to_string(),
            working_dir: working_dir.to_string(),
            env: env.clone(),
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        // New POSIX process group, led by this child, so `treekill::tree_kill`
        // can signal the whole tree at once instead of chasing descendants.
        #[cfg(unix)]
        cmd.process_group(0);
        for (k, v) in forced_tty_env() {
            cmd.env(k, v);
        }
        for (k, v) in &env {
            cmd.env(k, v);
        }

        let started_at = self.clock.now_ms();
        let child = cmd.spawn().map_err(|e| Error::StartFailure(e.to_string()))?;
        let pid = child.id();

        let mut state = ProcessState::new(id.clone(), config, started_at);
        if let Some(pid) = pid {
            state = state.with_pid(pid);
        }
        let handle = ProcessHandle::new(id.clone(), state);
        self.processes.insert(id.clone(), handle.clone());

        let event_bus = self.event_bus.clone();
        let clock = self.clock.clone();
        let log_store = self.log_store.clone();
        let process_id = id.clone();
        handle.spawn_readers(child, log_store, clock.clone(), move |exit_code| {
            event_bus.publish(Event::new(
                EventKind::ProcessStopped,
                Some(process_id.clone()),
                clock.now_ms(),
                json!({ "exitCode": exit_code }),
            ));
        });

        self.event_bus.publish(Event::new(
            EventKind::ProcessStarted,
            Some(id.clone()),
            started_at,
            json!({ "name": name, "pid": pid }),
        ));
        info!(process_id = %id, name, pid, "process started");

        Ok(id)
    }

    /// Requests termination of `id`'s OS process tree; idempotent.
    pub async fn stop_process(&self, id: &ProcessId) -> Result<()> {
        let handle = self
            .processes
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let snapshot = handle.snapshot();
        if snapshot.is_terminal() {
            return Ok(());
        }
        let Some(pid) = snapshot.pid else {
            return Err(Error::Internal("process has no recorded pid".into()));
        };

        handle.state.rcu(|prev| Arc::new(prev.stopping()));
        handle.cancel.cancel();
        treekill::tree_kill(pid).await;
        Ok(())
    }

    pub fn get_process(&self, id: &ProcessId) -> Option<Arc<ProcessState>> {
        self.processes.get(id).map(|e| e.value().snapshot())
    }

    pub fn get_all_processes(&self) -> Vec<Arc<ProcessState>> {
        self.processes.iter().map(|e| e.value().snapshot()).collect()
    }

    /// Registers a callback receiving each log line (and a final `None` at
    /// exit) for `id`. Drop the returned guard to unregister.
    pub fn register_log_callback(
        &self,
        id: &ProcessId,
        callback: impl Fn(Option<&str>) + Send + Sync + 'static,
    ) -> Result<LogCallback> {
        let handle = self
            .processes
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(handle.callbacks.register(Box::new(callback)))
    }

    /// Stops every non-terminal process, waiting for none of them — callers
    /// that need confirmation should poll `get_all_processes`.
    pub async fn stop_all_processes(&self) {
        let ids: Vec<ProcessId> = self.processes.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Err(e) = self.stop_process(&id).await {
                warn!(process_id = %id, error = %e, "failed to stop process during shutdown");
            }
        }
    }

    /// Best-effort sweep for processes this supervisor never tracked:
    /// anything still bound to `ports` or matching `patterns`.
    pub async fn cleanup(&self, ports: &[u16], patterns: &[String]) {
        for &port in ports {
            let pids = cleanup::cleanup_port(port).await;
            if !pids.is_empty() {
                info!(port, ?pids, "cleaned up orphaned process on port");
            }
        }
        for pattern in patterns {
            let pids = cleanup::cleanup_pattern(pattern).await;
            if !pids.is_empty() {
                info!(pattern, ?pids, "cleaned up orphaned process by pattern");
            }
        }
    }
}
