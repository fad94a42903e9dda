// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI crate.

use std::path::PathBuf;

/// Directory peer instances announce themselves in. Must agree with
/// `fm-daemon`'s resolution so the hub and every instance see the same set.
pub fn instances_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("FOREMAN_INSTANCES_DIR") {
        return Some(PathBuf::from(dir));
    }
    let base = dirs::state_dir().or_else(dirs::data_local_dir)?;
    Some(base.join("foreman").join("instances"))
}

/// Explicit override for the `foremand` binary path, for dev builds and tests.
pub fn daemon_binary_override() -> Option<String> {
    std::env::var("FOREMAN_DAEMON_BIN").ok()
}
