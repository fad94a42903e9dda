// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Log Store: a store-wide bounded ring buffer of log lines shared by every
//! process, with search, follow-streaming, and dev-server URL detection.

mod log_store;
mod url_detect;

pub use log_store::{LogQuery, LogStore, StreamedLog, DEFAULT_CAPACITY};
pub use url_detect::detect_urls;
