// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the per-instance state directory: `FOREMAN_STATE_DIR` >
/// `XDG_STATE_HOME/foreman/<instance-id>` > `~/.local/state/foreman/<instance-id>`.
pub fn state_dir(instance_id: &str) -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("FOREMAN_STATE_DIR") {
        return Ok(PathBuf::from(dir).join(instance_id));
    }
    let base = dirs::state_dir().or_else(dirs::data_local_dir).ok_or(LifecycleError::NoStateDir)?;
    Ok(base.join("foreman").join(instance_id))
}

/// Directory peer instances announce themselves in:
/// `FOREMAN_INSTANCES_DIR` > `~/.local/state/foreman/instances`.
pub fn instances_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("FOREMAN_INSTANCES_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::state_dir().or_else(dirs::data_local_dir).ok_or(LifecycleError::NoStateDir)?;
    Ok(base.join("foreman").join("instances"))
}
