// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watches the instances directory for peer announcements and calls back
//! with the full current set whenever it changes. Uses the OS-native
//! `notify` watcher as the primary signal with a poll tick as a fallback,
//! since not every filesystem (network mounts, some containers) delivers
//! reliable change notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fm_core::{Instance, InstanceId};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::announcement::scan_instances;

/// Poll interval used when no filesystem event watcher is available, and as
/// a periodic safety net even when one is.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Runs until `cancel` fires, invoking `on_update` with the full instance
/// map every time the directory's observable content changes (coalescing
/// rapid successive changes into one scan).
pub async fn watch(
    dir: PathBuf,
    cancel: CancellationToken,
    on_update: impl Fn(HashMap<InstanceId, Instance>) + Send + 'static,
) {
    let (tx, mut rx) = mpsc::channel::<()>(8);

    let watcher = {
        let tx = tx.clone();
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.try_send(());
            }
        })
    };

    let mut watcher = match watcher {
        Ok(mut w) => {
            if let Err(e) = w.watch(&dir, RecursiveMode::NonRecursive) {
                warn!(error = %e, "failed to watch instances directory, falling back to polling only");
            }
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "failed to create filesystem watcher, falling back to polling only");
            None
        }
    };

    let mut last: Option<HashMap<InstanceId, Instance>> = None;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {},
            _ = rx.recv() => {},
        }

        let current = scan(&dir).await;
        let changed = match &last {
            Some(prev) => !same_shape(prev, &current),
            None => true,
        };
        if changed {
            on_update(current.clone());
            last = Some(current);
        }
    }

    if let Some(w) = watcher.take() {
        drop(w);
    }
}

async fn scan(dir: &Path) -> HashMap<InstanceId, Instance> {
    match scan_instances(dir).await {
        Ok(instances) => instances.into_iter().map(|i| (i.id.clone(), i)).collect(),
        Err(e) => {
            warn!(error = %e, "instance directory scan failed");
            HashMap::new()
        }
    }
}

fn same_shape(a: &HashMap<InstanceId, Instance>, b: &HashMap<InstanceId, Instance>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.keys().all(|k| b.contains_key(k))
}
