// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Filesystem-based peer discovery: instances announce themselves by
//! writing a JSON file to a shared directory, refresh it on a ping
//! interval, and a watcher on every other instance (or the hub) reacts to
//! the directory's observable changes.

pub mod announcement;
pub mod cleanup;
pub mod watcher;

pub use announcement::{register_instance, scan_instances, unregister_instance, update_instance_ping};
pub use cleanup::{cleanup_stale_instances, STALE_THRESHOLD_MS};
pub use watcher::{watch, POLL_INTERVAL};
