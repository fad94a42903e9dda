// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning and probing the per-project `foremand` background process.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

/// Starts `foremand` detached from this process's stdio, rooted at `dir`
/// and preferring `port`. Returns immediately; callers should poll
/// [`wait_for_ready`] before talking to it.
pub fn start_daemon_background(dir: &std::path::Path, port: u16) -> std::io::Result<std::process::Child> {
    let binary = find_daemon_binary();
    Command::new(binary)
        .arg("--dir")
        .arg(dir)
        .arg("--port")
        .arg(port.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
}

/// Polls `http://127.0.0.1:<port>/health` until it answers or `timeout` elapses.
pub async fn wait_for_ready(client: &reqwest::Client, port: u16, timeout: Duration) -> bool {
    let url = format!("http://127.0.0.1:{port}/health");
    let start = Instant::now();
    while start.elapsed() < timeout {
        if client.get(&url).send().await.is_ok_and(|r| r.status().is_success()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

/// Locates the `foremand` binary: explicit override, then a sibling of the
/// running `foreman` executable, then bare `foremand` resolved via `PATH`.
fn find_daemon_binary() -> PathBuf {
    if let Some(path) = crate::env::daemon_binary_override() {
        return PathBuf::from(path);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("foremand");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("foremand")
}
