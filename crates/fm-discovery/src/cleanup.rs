// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Removes announcement files for instances that are both stale (no recent
//! ping) and confirmed dead (pid no longer alive). Either condition alone
//! is insufficient: a live but slow-to-ping instance must not be reaped,
//! and a dead instance should still have its last-known announcement
//! readable until the staleness threshold passes.

use std::path::Path;

use fm_core::InstanceId;
use tracing::info;

use crate::announcement::{scan_instances, unregister_instance};

/// Announcements whose `lastPing` is older than this are eligible for
/// removal, provided the pid is also confirmed dead.
pub const STALE_THRESHOLD_MS: i64 = 60_000;

/// Scans `dir`, removing announcements that are both stale and pid-dead.
/// Returns the ids that were removed.
pub async fn cleanup_stale_instances(dir: &Path, now_ms: i64) -> std::io::Result<Vec<InstanceId>> {
    let instances = scan_instances(dir).await?;
    let mut removed = Vec::new();

    for instance in instances {
        let age_ms = now_ms - instance.last_ping_ms;
        if age_ms < STALE_THRESHOLD_MS {
            continue;
        }
        if is_alive(instance.process_info.pid).await {
            continue;
        }
        unregister_instance(dir, &instance.id).await?;
        info!(id = %instance.id, age_ms, "removed stale dead instance announcement");
        removed.push(instance.id);
    }

    Ok(removed)
}

#[cfg(unix)]
async fn is_alive(pid: u32) -> bool {
    fm_adapters::treekill::is_alive(pid)
}

#[cfg(windows)]
async fn is_alive(pid: u32) -> bool {
    fm_adapters::treekill::is_alive(pid).await
}
