// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Discovery directory fallback poll interval (default: 5000ms).
pub fn watcher_poll_ms() -> Duration {
    parse_duration_ms("FOREMAN_WATCHER_POLL_MS").unwrap_or(Duration::from_secs(5))
}

/// Grace period between SIGTERM and SIGKILL during tree-kill (default: 3000ms).
pub fn kill_grace_ms() -> Duration {
    parse_duration_ms("FOREMAN_KILL_GRACE_MS").unwrap_or(Duration::from_secs(3))
}

/// Environment variables injected into every spawned child so interactive
/// dev-server CLIs keep emitting color/TTY-style output when run headless.
pub fn forced_tty_env() -> [(&'static str, &'static str); 3] {
    [
        ("FORCE_COLOR", "1"),
        ("COLORTERM", "truecolor"),
        ("TERM", "xterm-256color"),
    ]
}
