// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `foremand`: the per-project background daemon. Supervises `package.json`
//! scripts, keeps a rolling log per process, and exposes both over an MCP
//! Streamable HTTP server. Not meant to be run directly; `foreman` spawns
//! it and talks to it over the MCP transport.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fm_daemon::lifecycle::{self, Config};
use fm_daemon::resources::{ProcessesResource, RecentLogsResource};
use fm_daemon::tools::{LogsSearchTool, LogsStreamTool, ScriptsListTool, ScriptsRunTool, ScriptsStatusTool, ScriptsStopTool};
use fm_mcp::{server, ResourceRegistry, ServerState, ToolRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_PORT: u16 = 4200;
const MAX_PORT_ATTEMPTS: u16 = 20;
const PING_INTERVAL: Duration = Duration::from_secs(15);

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

fn parse_args() -> (PathBuf, u16) {
    let mut working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut port = std::env::var("FOREMAN_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT);

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dir" => {
                if let Some(dir) = args.next() {
                    working_dir = PathBuf::from(dir);
                }
            }
            "--port" => {
                if let Some(p) = args.next().and_then(|v| v.parse().ok()) {
                    port = p;
                }
            }
            "--version" | "-V" => {
                println!("foremand {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                std::process::exit(1);
            }
        }
    }
    (working_dir, port)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let (working_dir, preferred_port) = parse_args();
    let config = Config::load(working_dir, preferred_port)?;
    let instance_id = config.instance_id.clone();

    let state = Arc::new(lifecycle::startup(config)?);

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(ScriptsListTool { supervisor: state.supervisor.clone() }));
    tools.register(Arc::new(ScriptsRunTool {
        supervisor: state.supervisor.clone(),
        working_dir: state.config.working_dir.display().to_string(),
    }));
    tools.register(Arc::new(ScriptsStopTool { supervisor: state.supervisor.clone() }));
    tools.register(Arc::new(ScriptsStatusTool { supervisor: state.supervisor.clone() }));
    tools.register(Arc::new(LogsSearchTool { log_store: state.log_store.clone() }));
    tools.register(Arc::new(LogsStreamTool { log_store: state.log_store.clone() }));

    let mut resources = ResourceRegistry::new();
    resources.register(Arc::new(ProcessesResource { supervisor: state.supervisor.clone() }));
    resources.register(Arc::new(RecentLogsResource { log_store: state.log_store.clone() }));

    let server_state = ServerState::new(tools, resources);
    let (port, server_handle) = server::serve(server_state, state.config.preferred_port, MAX_PORT_ATTEMPTS).await?;
    info!(port, instance_id = %instance_id, "mcp server bound");

    state.announce().await?;
    info!(instance_id = %instance_id, "instance announced");

    let ping_state = state.clone();
    let ping_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            let now_ms = ping_state.clock.now_ms();
            if let Err(e) = fm_discovery::update_instance_ping(&ping_state.config.instances_dir, &ping_state.config.instance_id, now_ms).await {
                warn!(error = %e, "failed to refresh instance ping");
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c, shutting down anyway");
    }

    ping_task.abort();
    server_handle.abort();
    state.shutdown().await;

    Ok(())
}
