// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registered log callbacks for a process, with guard-based unregistration
//! so a disconnecting MCP session never leaks a forwarding slot.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

type Callback = Box<dyn Fn(Option<&str>) + Send + Sync + 'static>;

#[derive(Default)]
pub(crate) struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, Callback)>>,
}

impl CallbackRegistry {
    pub fn register(self: &Arc<Self>, callback: Callback) -> LogCallback {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, callback));
        LogCallback {
            id,
            registry: self.clone(),
        }
    }

    /// `None` signals end-of-stream (process exited).
    pub fn dispatch(&self, line: Option<&str>) {
        let callbacks = self.callbacks.read();
        for (_, cb) in callbacks.iter() {
            let cb = AssertUnwindSafe(cb);
            if catch_unwind(|| (cb.0)(line)).is_err() {
                error!("log callback panicked");
            }
        }
    }

    fn unregister(&self, id: u64) {
        self.callbacks.write().retain(|(cb_id, _)| *cb_id != id);
    }
}

/// Drop this to stop receiving log lines for the process it was registered on.
pub struct LogCallback {
    id: u64,
    registry: Arc<CallbackRegistry>,
}

impl Drop for LogCallback {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn dispatch_reaches_registered_callback() {
        let registry = Arc::new(CallbackRegistry::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _guard = registry.register(Box::new(move |line| {
            seen2.lock().unwrap().push(line.map(|s| s.to_string()));
        }));
        registry.dispatch(Some("hello"));
        registry.dispatch(None);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("hello".to_string()), None]
        );
    }

    #[test]
    fn dropping_guard_unregisters() {
        let registry = Arc::new(CallbackRegistry::default());
        let seen = Arc::new(Mutex::new(0u32));
        let seen2 = seen.clone();
        let guard = registry.register(Box::new(move |_| {
            *seen2.lock().unwrap() += 1;
        }));
        drop(guard);
        registry.dispatch(Some("after drop"));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn panicking_callback_does_not_stop_others() {
        let registry = Arc::new(CallbackRegistry::default());
        let _panicking = registry.register(Box::new(|_| panic!("boom")));
        let seen = Arc::new(Mutex::new(0u32));
        let seen2 = seen.clone();
        let _guard = registry.register(Box::new(move |_| {
            *seen2.lock().unwrap() += 1;
        }));
        registry.dispatch(Some("line"));
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
