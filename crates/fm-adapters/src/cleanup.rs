// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort cleanup of dev-server processes the supervisor no longer
//! tracks: by port, or by command-line pattern.

use tokio::process::Command;

use crate::subprocess::{run_with_timeout, PATTERN_LOOKUP_TIMEOUT, PORT_LOOKUP_TIMEOUT};
use crate::treekill::tree_kill;

/// Finds and tree-kills whatever process is bound to `port`, if any.
/// Returns the pids that were signalled.
pub async fn cleanup_port(port: u16) -> Vec<u32> {
    let pids = find_pids_by_port(port).await;
    for &pid in &pids {
        tree_kill(pid).await;
    }
    pids
}

/// Finds and tree-kills every process whose command line matches `pattern`
/// (a plain substring match, not a regex, to match `pgrep -f`/`findstr`
/// semantics). Returns the pids that were signalled.
pub async fn cleanup_pattern(pattern: &str) -> Vec<u32> {
    let pids = find_pids_by_pattern(pattern).await;
    for &pid in &pids {
        tree_kill(pid).await;
    }
    pids
}

#[cfg(unix)]
async fn find_pids_by_port(port: u16) -> Vec<u32> {
    let mut cmd = Command::new("lsof");
    cmd.args(["-ti", &format!(":{port}")]);
    let Ok(output) = run_with_timeout(cmd, PORT_LOOKUP_TIMEOUT, "lsof").await else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect()
}

#[cfg(windows)]
async fn find_pids_by_port(port: u16) -> Vec<u32> {
    let mut cmd = Command::new("netstat");
    cmd.args(["-ano"]);
    let Ok(output) = run_with_timeout(cmd, PORT_LOOKUP_TIMEOUT, "netstat").await else {
        return Vec::new();
    };
    let needle = format!(":{port} ");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| l.contains(&needle))
        .filter_map(|l| l.split_whitespace().last())
        .filter_map(|pid| pid.parse().ok())
        .collect()
}

#[cfg(unix)]
async fn find_pids_by_pattern(pattern: &str) -> Vec<u32> {
    let mut cmd = Command::new("pgrep");
    cmd.args(["-f", pattern]);
    let Ok(output) = run_with_timeout(cmd, PATTERN_LOOKUP_TIMEOUT, "pgrep -f").await else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect()
}

#[cfg(windows)]
async fn find_pids_by_pattern(pattern: &str) -> Vec<u32> {
    let mut cmd = Command::new("tasklist");
    cmd.args(["/FO", "CSV"]);
    let Ok(output) = run_with_timeout(cmd, PATTERN_LOOKUP_TIMEOUT, "tasklist").await else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| l.contains(pattern))
        .filter_map(|l| l.split(',').nth(1))
        .filter_map(|pid| pid.trim_matches('"').parse().ok())
        .collect()
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_port_on_unused_port_signals_nothing() {
        // Port 1 is privileged and almost certainly unbound in test sandboxes.
        let pids = cleanup_port(1).await;
        assert!(pids.is_empty());
    }

    #[tokio::test]
    async fn cleanup_pattern_with_no_matches_signals_nothing() {
        let pids = cleanup_pattern("definitely-not-a-real-process-xyz123").await;
        assert!(pids.is_empty());
    }
}
