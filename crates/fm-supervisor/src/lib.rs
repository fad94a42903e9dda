// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Process Supervisor: spawns, tracks, and tears down child processes,
//! publishing state via an atomically-swapped snapshot and fanning out
//! their output to the Log Store and Event Bus.

mod callbacks;
mod handle;
mod supervisor;

pub use callbacks::LogCallback;
pub use handle::ProcessHandle;
pub use supervisor::Supervisor;
