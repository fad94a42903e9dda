// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `foreman`: starts (or reuses) the per-project daemon and runs scripts
//! through it, or — with `--mcp` — runs as a stdio MCP hub aggregating
//! every discovered instance for an external MCP client.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod color;
mod daemon_process;
mod env;
mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fm_core::{Clock, SystemClock};
use fm_hub::{check_not_interactive, serve_stdio, ConnectionManager};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_PORT: u16 = 4200;
const STALE_PING_THRESHOLD_MS: i64 = 45_000;
const DAEMON_READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "foreman", version, styles = color::styles())]
struct Cli {
    /// Script names (from package.json) or a quoted ad-hoc command to run.
    scripts: Vec<String>,

    /// Project directory this instance supervises. Defaults to the cwd.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Preferred port for the instance's MCP server.
    #[arg(long)]
    port: Option<u16>,

    /// Fail instead of starting a daemon if one isn't already running.
    #[arg(long)]
    no_mcp: bool,

    /// Run as a stdio MCP hub aggregating every discovered instance.
    #[arg(long)]
    mcp: bool,

    /// Override the discovery directory peers announce themselves in.
    #[arg(long)]
    instances_dir: Option<PathBuf>,

    /// Accepted for compatibility with terminal-UI frontends; this binary
    /// never renders one itself.
    #[arg(long)]
    no_tui: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let exit_code = if cli.mcp { run_hub(cli).await } else { run_instance(cli).await };
    std::process::exit(exit_code);
}

async fn run_hub(cli: Cli) -> i32 {
    if !check_not_interactive() {
        return 1;
    }
    let Some(instances_dir) = cli.instances_dir.or_else(env::instances_dir) else {
        eprintln!("error: could not determine instances directory");
        return 1;
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let manager = ConnectionManager::new();
    match fm_discovery::scan_instances(&instances_dir).await {
        Ok(instances) => {
            for instance in instances {
                let conn = manager.upsert_discovered(instance, clock.now_ms());
                let _ = manager.try_connect(&conn.instance.id, clock.now_ms()).await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to scan instances directory at hub startup"),
    }

    serve_stdio(manager, clock).await;
    0
}

async fn run_instance(cli: Cli) -> i32 {
    let dir = cli.dir.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
    let preferred_port = cli.port.unwrap_or(DEFAULT_PORT);
    let instances_dir = cli.instances_dir.or_else(env::instances_dir);
    let client = reqwest::Client::new();

    let running_port = match &instances_dir {
        Some(instances_dir) => find_running_instance_port(instances_dir, &dir).await,
        None => None,
    };

    let port = match running_port {
        Some(port) => port,
        None if cli.no_mcp => {
            eprintln!("error: no foreman instance is running for {} and --no-mcp prevents starting one", dir.display());
            return 1;
        }
        None => {
            if let Err(e) = daemon_process::start_daemon_background(&dir, preferred_port) {
                eprintln!("error: failed to start foreman daemon: {e}");
                return 1;
            }
            if !daemon_process::wait_for_ready(&client, preferred_port, DAEMON_READY_TIMEOUT).await {
                eprintln!("error: foreman daemon did not become ready within {DAEMON_READY_TIMEOUT:?}");
                return 1;
            }
            preferred_port
        }
    };

    if cli.scripts.is_empty() {
        println!("foreman instance ready on http://127.0.0.1:{port}/mcp");
        return 0;
    }

    for script in &cli.scripts {
        if let Err(e) = run_script(&client, port, script).await {
            eprintln!("error: failed to start '{script}': {e}");
            return 1;
        }
        println!("started: {script}");
    }
    0
}

async fn find_running_instance_port(instances_dir: &std::path::Path, dir: &std::path::Path) -> Option<u16> {
    let instances = fm_discovery::scan_instances(instances_dir).await.ok()?;
    let now_ms = SystemClock.now_ms();
    instances.into_iter().find_map(|instance| {
        let same_dir = std::path::Path::new(&instance.directory) == dir;
        let fresh = now_ms.saturating_sub(instance.last_ping_ms) < STALE_PING_THRESHOLD_MS;
        (same_dir && fresh).then_some(instance.port)
    })
}

async fn run_script(client: &reqwest::Client, port: u16, script: &str) -> anyhow::Result<()> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "scripts_run", "arguments": {"name": script}},
    });
    let resp = client.post(format!("http://127.0.0.1:{port}/mcp")).json(&body).send().await?;
    let value: serde_json::Value = resp.json().await?;
    if let Some(error) = value.get("error") {
        anyhow::bail!("{}", error["message"].as_str().unwrap_or("unknown error"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_scripts_and_flags() {
        let cli = Cli::parse_from(["foreman", "dev", "--port", "5000", "--no-mcp"]);
        assert_eq!(cli.scripts, vec!["dev".to_string()]);
        assert_eq!(cli.port, Some(5000));
        assert!(cli.no_mcp);
        assert!(!cli.mcp);
    }

    #[test]
    fn cli_parses_hub_mode() {
        let cli = Cli::parse_from(["foreman", "--mcp"]);
        assert!(cli.mcp);
        assert!(cli.scripts.is_empty());
    }
}
