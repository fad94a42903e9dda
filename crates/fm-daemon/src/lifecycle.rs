// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup acquires an exclusive PID lock, writes a
//! version file, builds the shared Supervisor/LogStore/EventBus, starts the
//! MCP HTTP server, and announces the instance to the discovery directory.
//! Shutdown reverses each step in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fm_adapters::{DesktopNotifyAdapter, NotifyAdapter};
use fm_core::{Clock, Event, EventBus, EventKind, Instance, InstanceId, ProcessInfo, SystemClock, UuidIdGen};
use fm_storage::LogStore;
use fm_supervisor::Supervisor;
use fs2::FileExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::env;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: another instance already running in this directory?")]
    LockFailed(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mcp server failed to bind: {0}")]
    Bind(std::io::Error),
}

/// Daemon configuration. One instance per working directory; `instance_id`
/// is generated once at startup and reused for this process's lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    pub instance_id: InstanceId,
    pub name: String,
    pub working_dir: PathBuf,
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub instances_dir: PathBuf,
    pub preferred_port: u16,
}

impl Config {
    pub fn load(working_dir: PathBuf, preferred_port: u16) -> Result<Self, LifecycleError> {
        let name = working_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("foreman")
            .to_string();
        let instance_id = Instance::generate_id(&name, random_hex16().as_deref(), fallback_nanos());
        let state_dir = env::state_dir(instance_id.as_str())?;
        let instances_dir = env::instances_dir()?;
        Ok(Self {
            lock_path: state_dir.join("foreman.pid"),
            version_path: state_dir.join("foreman.version"),
            state_dir,
            instances_dir,
            instance_id,
            name,
            working_dir,
            preferred_port,
        })
    }
}

fn random_hex16() -> Option<String> {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    // Two independent hasher seeds give us 16 bytes of OS-sourced randomness
    // without pulling in a dedicated RNG crate for one call site.
    let a = RandomState::new().build_hasher().finish();
    let b = RandomState::new().build_hasher().finish();
    Some(format!("{a:08x}{b:08x}"))
}

fn fallback_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Shared runtime state handed to the MCP tool/resource handlers.
pub struct DaemonState {
    pub config: Config,
    pub supervisor: Arc<Supervisor>,
    pub log_store: Arc<LogStore>,
    pub event_bus: EventBus,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
    lock_file: std::fs::File,
}

impl DaemonState {
    /// Announces this instance to the discovery directory and returns the
    /// announcement, so the caller can spawn the periodic ping refresher.
    pub async fn announce(&self) -> std::io::Result<Instance> {
        let instance = Instance {
            id: self.config.instance_id.clone(),
            name: self.config.name.clone(),
            directory: self.config.working_dir.display().to_string(),
            port: self.config.preferred_port,
            started_at_ms: self.clock.now_ms(),
            last_ping_ms: self.clock.now_ms(),
            process_info: ProcessInfo {
                pid: std::process::id(),
                executable: std::env::current_exe().map(|p| p.display().to_string()).unwrap_or_default(),
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        fm_discovery::register_instance(&self.config.instances_dir, &instance).await?;
        Ok(instance)
    }

    /// Graceful shutdown: best-effort stop every supervised process, remove
    /// the announcement, then the PID/version files. The lock releases when
    /// `self.lock_file` drops.
    pub async fn shutdown(&self) {
        info!("shutting down foreman instance");
        self.supervisor.stop_all_processes().await;

        if let Err(e) = fm_discovery::unregister_instance(&self.config.instances_dir, &self.config.instance_id).await {
            warn!(error = %e, "failed to remove instance announcement");
        }
        for path in [&self.config.lock_path, &self.config.version_path] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(?path, error = %e, "failed to remove lifecycle file");
                }
            }
        }
        info!("shutdown complete");
    }
}

/// Acquires the lock, creates the state directory, and builds the shared
/// Supervisor/LogStore/EventBus. Does not bind the MCP server or announce;
/// callers that want a fully running instance should call those next.
pub fn startup(config: Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(&config) {
        Ok(state) => Ok(state),
        Err(e) => {
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(&config);
            }
            Err(e)
        }
    }
}

fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    {
        use std::io::Write;
        let mut f = &lock_file;
        writeln!(f, "{}", std::process::id())?;
    }

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_bus = EventBus::new();
    let log_store = Arc::new(LogStore::new(clock.clone(), event_bus.clone()));
    let scripts = read_package_scripts(&config.working_dir);
    let supervisor = Arc::new(Supervisor::new(
        scripts,
        log_store.clone(),
        event_bus.clone(),
        clock.clone(),
        Arc::new(UuidIdGen),
    ));

    notify_on_crash(&event_bus);

    info!(instance_id = %config.instance_id, "foreman instance started");

    Ok(DaemonState {
        config: config.clone(),
        supervisor,
        log_store,
        event_bus,
        clock,
        start_time: Instant::now(),
        lock_file,
    })
}

/// Reads the `scripts` object out of `package.json` in `dir`, if present.
/// No package-manager detection: this is a literal read of the one file
/// format every Node project already has.
fn read_package_scripts(dir: &std::path::Path) -> std::collections::HashMap<String, String> {
    let Ok(bytes) = std::fs::read(dir.join("package.json")) else {
        return std::collections::HashMap::new();
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return std::collections::HashMap::new();
    };
    value
        .get("scripts")
        .and_then(|s| s.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Subscribes to `ProcessStopped` and fires a desktop notification for any
/// exit with a nonzero code. Exits with no code (killed by signal, e.g. via
/// `stop_process`) are not treated as crashes.
fn notify_on_crash(event_bus: &EventBus) {
    event_bus.subscribe(
        EventKind::ProcessStopped,
        Box::new(move |event: Event| {
            let exit_code = event.data.get("exitCode").and_then(|v| v.as_i64());
            let Some(code) = exit_code else { return };
            if code == 0 {
                return;
            }
            let process_id = event.process_id.map(|id| id.as_str().to_string()).unwrap_or_default();
            let message = format!("process {process_id} exited with code {code}");
            tokio::spawn(async move {
                let adapter = DesktopNotifyAdapter::new();
                let _ = adapter.notify("foreman: process crashed", &message).await;
            });
        }),
    );
}

fn cleanup_on_failure(config: &Config) {
    for path in [&config.lock_path, &config.version_path] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_load_derives_instance_name_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FOREMAN_STATE_DIR", dir.path().join("state"));
        std::env::set_var("FOREMAN_INSTANCES_DIR", dir.path().join("instances"));
        let working = dir.path().join("my-project");
        std::fs::create_dir_all(&working).unwrap();
        let config = Config::load(working, 4000).unwrap();
        assert!(config.instance_id.as_str().starts_with("my-project-"));
    }

    #[tokio::test]
    async fn notify_on_crash_ignores_clean_exit() {
        let event_bus = EventBus::new();
        notify_on_crash(&event_bus);
        event_bus.publish(Event::new(EventKind::ProcessStopped, None, 0, serde_json::json!({"exitCode": 0})));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // No assertion beyond "does not panic": a real notification attempt
        // would be a no-op in this sandboxed test environment anyway.
    }

    #[test]
    fn startup_then_second_startup_in_same_dir_fails_to_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("FOREMAN_STATE_DIR", dir.path().join("state"));
        std::env::set_var("FOREMAN_INSTANCES_DIR", dir.path().join("instances"));
        let working = dir.path().join("proj");
        std::fs::create_dir_all(&working).unwrap();

        let config = Config::load(working.clone(), 4000).unwrap();
        let first = startup(config.clone()).unwrap();

        let second = startup(config);
        assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
        drop(first);
    }
}
