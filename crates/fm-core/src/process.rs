// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised process identity, configuration, and immutable state snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::ProcessId;

/// Lifecycle status of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Spawned, stdout/stderr readers attached, not yet observed to exit.
    Running,
    /// Stop was requested; tree-kill is in progress.
    Stopping,
    /// Stop was requested and the child has now exited; `exit_code` is
    /// pinned to `-1` regardless of what the OS actually reported.
    Stopped,
    /// The child exited on its own with a non-zero code, or the OS refused
    /// to spawn it at all.
    Failed,
    /// The child exited on its own with code `0`.
    Success,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Success => "success",
        };
        write!(f, "{s}")
    }
}

/// What to spawn and how, supplied by `startScript`/`startCommand`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Human-readable name (script name, or a derived label for ad-hoc commands).
    pub name: String,
    /// Full command line as passed to the shell.
    pub command: String,
    /// Working directory the child is spawned in.
    pub working_dir: String,
    /// Extra environment variables merged over the inherited environment.
    pub env: HashMap<String, String>,
}

/// Immutable, point-in-time snapshot of a supervised process.
///
/// Published via `arc_swap::ArcSwap<ProcessState>` so readers always see a
/// complete, torn-free value; `fm-supervisor` is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessState {
    pub id: ProcessId,
    pub config: ProcessConfig,
    pub status: ProcessStatus,
    /// OS pid, set once at spawn and never cleared (useful after exit for
    /// diagnosing leftover children the tree-kill could not reach).
    pub pid: Option<u32>,
    pub started_at_ms: i64,
    pub exited_at_ms: Option<i64>,
    pub exit_code: Option<i32>,
}

impl ProcessState {
    pub fn new(id: ProcessId, config: ProcessConfig, started_at_ms: i64) -> Self {
        Self {
            id,
            config,
            status: ProcessStatus::Running,
            pid: None,
            started_at_ms,
            exited_at_ms: None,
            exit_code: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProcessStatus::Stopped | ProcessStatus::Failed | ProcessStatus::Success
        )
    }

    /// Returns a clone with `pid` recorded; used right after spawn.
    pub fn with_pid(&self, pid: u32) -> Self {
        let mut next = self.clone();
        next.pid = Some(pid);
        next
    }

    /// Returns a clone transitioned to `Stopping`, unless already terminal.
    pub fn stopping(&self) -> Self {
        if self.is_terminal() {
            return self.clone();
        }
        let mut next = self.clone();
        next.status = ProcessStatus::Stopping;
        next
    }

    /// Returns a clone transitioned to a terminal status derived from
    /// `exit_code`, unless already terminal.
    ///
    /// A process already in `Stopping` (an explicit `stopProcess` call is in
    /// flight) lands on `Stopped` with `exit_code` pinned to `-1`, regardless
    /// of what the OS actually reported — the kill, not the exit code, is
    /// authoritative. Otherwise this was a natural exit: code `0` is
    /// `Success`, anything else is `Failed`.
    pub fn exited(&self, exit_code: Option<i32>, at_ms: i64) -> Self {
        if self.is_terminal() {
            return self.clone();
        }
        let mut next = self.clone();
        if self.status == ProcessStatus::Stopping {
            next.status = ProcessStatus::Stopped;
            next.exit_code = Some(-1);
        } else {
            next.status = match exit_code {
                Some(0) => ProcessStatus::Success,
                _ => ProcessStatus::Failed,
            };
            next.exit_code = exit_code;
        }
        next.exited_at_ms = Some(at_ms);
        next
    }

    /// Returns a clone transitioned to `Failed` (spawn never succeeded).
    pub fn failed(&self, at_ms: i64) -> Self {
        if self.is_terminal() {
            return self.clone();
        }
        let mut next = self.clone();
        next.status = ProcessStatus::Failed;
        next.exited_at_ms = Some(at_ms);
        next
    }
}

/// Owning handle side of a process; kept separate from `ProcessState` so the
/// state snapshot stays `Clone + Serialize` while the live `Child` does not.
pub struct Process {
    pub id: ProcessId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProcessConfig {
        ProcessConfig {
            name: "dev".into(),
            command: "npm run dev".into(),
            working_dir: "/tmp".into(),
            env: HashMap::new(),
        }
    }

    #[test]
    fn natural_exit_with_code_zero_is_success() {
        let state = ProcessState::new(ProcessId::new("p1"), config(), 0);
        let exited = state.exited(Some(0), 10);
        assert_eq!(exited.status, ProcessStatus::Success);
        assert_eq!(exited.exit_code, Some(0));
    }

    #[test]
    fn natural_exit_with_nonzero_code_is_failed() {
        let state = ProcessState::new(ProcessId::new("p1"), config(), 0);
        let exited = state.exited(Some(1), 10);
        assert_eq!(exited.status, ProcessStatus::Failed);
        assert_eq!(exited.exit_code, Some(1));
    }

    #[test]
    fn terminal_transitions_are_idempotent() {
        let state = ProcessState::new(ProcessId::new("p1"), config(), 0);
        let success = state.exited(Some(0), 10);
        assert_eq!(success.status, ProcessStatus::Success);
        let still_success = success.exited(Some(1), 20);
        assert_eq!(still_success.exit_code, Some(0));
        assert_eq!(still_success.exited_at_ms, Some(10));
    }

    #[test]
    fn stopping_then_exited_pins_exit_code_to_negative_one() {
        let state = ProcessState::new(ProcessId::new("p1"), config(), 0).stopping();
        assert_eq!(state.status, ProcessStatus::Stopping);
        let final_state = state.exited(Some(143), 5);
        assert_eq!(final_state.status, ProcessStatus::Stopped);
        assert_eq!(final_state.exit_code, Some(-1));
    }

    #[test]
    fn failed_never_overwritten_by_exited() {
        let state = ProcessState::new(ProcessId::new("p1"), config(), 0).failed(1);
        let after = state.exited(Some(0), 2);
        assert_eq!(after.status, ProcessStatus::Failed);
        assert_eq!(after.exit_code, None);
    }
}
