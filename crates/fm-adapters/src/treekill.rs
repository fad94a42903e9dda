// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tree-kill: terminate a process and every descendant it spawned.
//!
//! POSIX: enumerate descendants via `pgrep -P`, signal the whole set with
//! `SIGTERM`, wait a grace period, re-scan for survivors and `SIGKILL` them.
//! Windows: `taskkill /T /F` does the tree walk itself; we verify with
//! `tasklist` afterwards since `taskkill` can report success while a
//! handle-protected child lingers.

use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::env::kill_grace_ms;
use crate::subprocess::{run_with_timeout, PATTERN_LOOKUP_TIMEOUT, WINDOWS_KILL_TIMEOUT};

#[cfg(unix)]
async fn descendants_of(pid: u32) -> Vec<u32> {
    let mut frontier = vec![pid];
    let mut all = Vec::new();
    while let Some(parent) = frontier.pop() {
        let mut cmd = Command::new("pgrep");
        cmd.arg("-P").arg(parent.to_string());
        let Ok(output) = run_with_timeout(cmd, PATTERN_LOOKUP_TIMEOUT, "pgrep -P").await else {
            continue;
        };
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if let Ok(child) = line.trim().parse::<u32>() {
                all.push(child);
                frontier.push(child);
            }
        }
    }
    all
}

#[cfg(unix)]
fn signal(pid: u32, sig: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    // ESRCH just means the process already exited; nothing to report.
    let _ = kill(Pid::from_raw(pid as i32), sig);
}

/// Signals the whole process group led by `pgid`. Children are spawned via
/// `.process_group(0)`, so `pgid` is both the leader's pid and the group id.
#[cfg(unix)]
fn signal_group(pgid: u32, sig: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;
    let _ = killpg(Pid::from_raw(pgid as i32), sig);
}

/// Signal-0 liveness probe: true iff the OS still has a process at `pid`.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// `tasklist`-based liveness probe, since Windows has no signal-0 equivalent.
#[cfg(windows)]
pub async fn is_alive(pid: u32) -> bool {
    let mut cmd = Command::new("tasklist");
    cmd.args(["/FI", &format!("PID eq {pid}")]);
    match run_with_timeout(cmd, PATTERN_LOOKUP_TIMEOUT, "tasklist").await {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        Err(_) => false,
    }
}

/// Sends SIGTERM to the process group (and, redundantly, each descendant
/// pid individually — covers children that escaped the group, e.g. by
/// double-forking into a new session), waits `kill_grace_ms()`, then
/// SIGKILLs the group and anything still alive.
#[cfg(unix)]
pub async fn tree_kill(pid: u32) {
    use nix::sys::signal::Signal;
    let mut targets = descendants_of(pid).await;
    targets.push(pid);

    signal_group(pid, Signal::SIGTERM);
    for &t in &targets {
        signal(t, Signal::SIGTERM);
    }

    tokio::time::sleep(kill_grace_ms()).await;

    let survivors: Vec<u32> = targets.into_iter().filter(|&p| is_alive(p)).collect();
    if !survivors.is_empty() {
        signal_group(pid, Signal::SIGKILL);
    }
    for &p in &survivors {
        signal(p, Signal::SIGKILL);
    }
    if !survivors.is_empty() {
        warn!(?survivors, "sigkill sent after sigterm grace period expired");
    }
}

#[cfg(windows)]
pub async fn tree_kill(pid: u32) {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T", "/F"]);
    let _ = run_with_timeout(cmd, WINDOWS_KILL_TIMEOUT, "taskkill").await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut verify = Command::new("tasklist");
    verify.args(["/FI", &format!("PID eq {pid}")]);
    if let Ok(output) = run_with_timeout(verify, WINDOWS_KILL_TIMEOUT, "tasklist").await {
        let out = String::from_utf8_lossy(&output.stdout);
        if out.contains(&pid.to_string()) {
            warn!(pid, "process still present after taskkill /T /F");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(unix)]
    async fn tree_kill_terminates_a_sleeping_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().unwrap();
        tree_kill(pid).await;
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn descendants_of_nonexistent_pid_is_empty() {
        let found = descendants_of(999_999).await;
        assert!(found.is_empty());
    }
}
