// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entry types stored by the Log Store.

use serde::{Deserialize, Serialize};

use crate::id::ProcessId;

/// Which stream produced a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// Synthetic lines emitted by the supervisor itself (start/stop notices).
    System,
}

/// Severity assigned to a log line, derived from `source` plus simple
/// pattern matching (not user-configurable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// One line appended to a process's log ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic, strictly increasing id assigned by the Log Store, scoped
    /// to one process's ring (never reused, even across eviction).
    pub id: u64,
    pub process_id: ProcessId,
    pub source: LogSource,
    pub level: LogLevel,
    pub content: String,
    pub timestamp_ms: i64,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.source == LogSource::Stderr || self.level == LogLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: LogSource, level: LogLevel) -> LogEntry {
        LogEntry {
            id: 1,
            process_id: ProcessId::new("p1"),
            source,
            level,
            content: "line".into(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn stderr_source_is_always_an_error() {
        assert!(entry(LogSource::Stderr, LogLevel::Info).is_error());
    }

    #[test]
    fn error_level_on_stdout_is_still_an_error() {
        assert!(entry(LogSource::Stdout, LogLevel::Error).is_error());
    }

    #[test]
    fn plain_stdout_info_is_not_an_error() {
        assert!(!entry(LogSource::Stdout, LogLevel::Info).is_error());
    }
}
