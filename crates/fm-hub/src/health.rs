// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background health monitor: probes every `active` connection on a fixed
//! interval and drives it through the retry/dead transitions on failure.
//! Exposes three hooks so callers (event bus glue, logging) can react
//! without polling connection state themselves.

use std::sync::Arc;
use std::time::Duration;

use fm_core::connection::ConnectionState;
use fm_core::{Clock, InstanceId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;

/// Default interval between health probes of `active` connections.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum HealthEvent {
    Unhealthy(InstanceId),
    Recovered(InstanceId),
    Dead(InstanceId),
}

/// Runs until `cancel` fires, probing every connection currently `active`
/// once per tick and forwarding transitions through `events`.
pub async fn run(
    manager: ConnectionManager,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    events: mpsc::Sender<HealthEvent>,
) {
    let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                probe_all(&manager, clock.as_ref(), &events).await;
            }
        }
    }
}

async fn probe_all(manager: &ConnectionManager, clock: &dyn Clock, events: &mpsc::Sender<HealthEvent>) {
    for snapshot in manager.list() {
        if snapshot.state != ConnectionState::Active {
            continue;
        }
        let Some(conn) = manager.get(&snapshot.instance_id) else { continue };
        let url = format!("{}/health", conn.base_url());
        let now_ms = clock.now_ms();

        match conn.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(id = %snapshot.instance_id, "health probe ok");
            }
            Ok(resp) => {
                warn!(id = %snapshot.instance_id, status = %resp.status(), "health probe failed");
                transition_unhealthy(manager, &snapshot.instance_id, now_ms, events).await;
            }
            Err(e) => {
                warn!(id = %snapshot.instance_id, error = %e, "health probe errored");
                transition_unhealthy(manager, &snapshot.instance_id, now_ms, events).await;
            }
        }
    }
}

async fn transition_unhealthy(
    manager: &ConnectionManager,
    id: &InstanceId,
    now_ms: i64,
    events: &mpsc::Sender<HealthEvent>,
) {
    let Some(conn) = manager.get(id) else { return };
    let _ = events.send(HealthEvent::Unhealthy(id.clone())).await;
    if manager.try_connect(id, now_ms).await.is_ok() {
        let _ = events.send(HealthEvent::Recovered(id.clone())).await;
    } else if conn.state() == ConnectionState::Dead {
        let _ = events.send(HealthEvent::Dead(id.clone())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_core::{FakeClock, Instance, ProcessInfo};

    fn sample(id: &str, port: u16) -> Instance {
        Instance {
            id: InstanceId::new(id),
            name: "demo".into(),
            directory: "/tmp".into(),
            port,
            started_at_ms: 0,
            last_ping_ms: 0,
            process_info: ProcessInfo { pid: 1, executable: "/bin/demo".into() },
            version: "0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn unreachable_active_connection_is_flagged_unhealthy() {
        let manager = ConnectionManager::new();
        let conn = manager.upsert_discovered(sample("i1", 1), 0);
        conn.transition(ConnectionState::Connecting, 0, None);
        conn.transition(ConnectionState::Active, 0, None);

        let (tx, mut rx) = mpsc::channel(8);
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        probe_all(&manager, clock.as_ref(), &tx).await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::Unhealthy(id) if id == InstanceId::new("i1")));
    }
}
