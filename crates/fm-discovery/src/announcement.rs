// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading and writing instance announcement files: one JSON file per
//! running foreman instance in a well-known directory.

use std::path::{Path, PathBuf};

use fm_core::{Instance, InstanceId};
use tracing::warn;

fn announcement_path(dir: &Path, id: &InstanceId) -> PathBuf {
    dir.join(format!("{}.json", id.as_str()))
}

/// Writes (or overwrites) the announcement file for `instance`.
pub async fn register_instance(dir: &Path, instance: &Instance) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = announcement_path(dir, &instance.id);
    let body = serde_json::to_vec_pretty(instance).expect("Instance serializes");
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

/// Removes the announcement file for `id`. Missing files are not an error:
/// a clean shutdown racing another cleanup pass is expected.
pub async fn unregister_instance(dir: &Path, id: &InstanceId) -> std::io::Result<()> {
    match tokio::fs::remove_file(announcement_path(dir, id)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Rewrites the announcement file with a refreshed `lastPing` timestamp.
pub async fn update_instance_ping(dir: &Path, id: &InstanceId, now_ms: i64) -> std::io::Result<()> {
    let path = announcement_path(dir, id);
    let bytes = tokio::fs::read(&path).await?;
    let mut instance: Instance = serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    instance.last_ping_ms = now_ms;
    register_instance(dir, &instance).await
}

/// Scans `dir` for `*.json` announcement files. A file that fails to parse
/// is logged and skipped rather than aborting the whole scan.
pub async fn scan_instances(dir: &Path) -> std::io::Result<Vec<Instance>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Instance>(&bytes) {
                Ok(instance) => found.push(instance),
                Err(e) => warn!(?path, error = %e, "skipping unparsable instance announcement"),
            },
            Err(e) => warn!(?path, error = %e, "skipping unreadable instance announcement"),
        }
    }
    Ok(found)
}
