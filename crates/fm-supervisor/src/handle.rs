// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owning handle for one supervised process: its atomically-published
//! `ProcessState` and the reader tasks draining stdout/stderr. Termination
//! goes through `fm-adapters::treekill` by pid, so the live `Child` only
//! needs to be kept alive long enough to be awaited by the exit-watcher
//! task spawned in `spawn_readers`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use fm_core::{Clock, LogSource, ProcessId, ProcessState};
use fm_storage::LogStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::callbacks::CallbackRegistry;

/// Live handle to a supervised process.
///
/// `state` is the single source of truth readers observe; it is updated via
/// `ArcSwap::rcu`, which may invoke the update closure more than once under
/// contention, so every transition closure must be pure and a no-op when
/// applied to an already-terminal state (see `ProcessState::exited` etc.).
pub struct ProcessHandle {
    pub id: ProcessId,
    pub state: ArcSwap<ProcessState>,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) cancel: CancellationToken,
}

impl ProcessHandle {
    pub fn new(id: ProcessId, initial: ProcessState) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: ArcSwap::from_pointee(initial),
            callbacks: Arc::new(CallbackRegistry::default()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn snapshot(&self) -> Arc<ProcessState> {
        self.state.load_full()
    }

    /// Detaches stdout/stderr from `child` and spawns one reader task per
    /// stream plus an exit-waiter task that owns `child` until it exits.
    /// Must be called once, right after construction.
    pub fn spawn_readers(
        self: &Arc<Self>,
        mut child: Child,
        log_store: Arc<LogStore>,
        clock: Arc<dyn Clock>,
        on_exit: impl FnOnce(Option<i32>) + Send + 'static,
    ) {
        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(stdout, LogSource::Stdout, log_store.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(stderr, LogSource::Stderr, log_store.clone());
        }

        let handle = self.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let exit_code = status.ok().and_then(|s| s.code());
            handle
                .state
                .rcu(|prev| Arc::new(prev.exited(exit_code, clock.now_ms())));
            handle.callbacks.dispatch(None);
            info!(process_id = %handle.id, ?exit_code, "process exited");
            on_exit(exit_code);
        });
    }

    fn spawn_reader<R>(self: &Arc<Self>, reader: R, source: LogSource, log_store: Arc<LogStore>)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        handle.callbacks.dispatch(Some(&line));
                        let level = if source == LogSource::Stderr {
                            fm_core::LogLevel::Error
                        } else {
                            fm_core::LogLevel::Info
                        };
                        log_store.add(handle.id.clone(), source, line, level);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(process_id = %handle.id, error = %e, "log reader stopped on io error");
                        break;
                    }
                }
            }
        });
    }
}
