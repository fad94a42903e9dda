// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory, multi-subscriber Event Bus (no durability: events that are
//! published before a subscriber attaches, or dropped for being full, are
//! gone for good).

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::event::{Event, EventKind};

/// Per-subscriber channel capacity. A slow subscriber drops events rather
/// than slowing down `publish` for everyone else.
const SUBSCRIBER_CAPACITY: usize = 256;

type HandlerFn = Box<dyn Fn(Event) + Send + Sync + 'static>;

struct Subscriber {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

/// Publish side of the bus. Cheap to clone; all clones share the same
/// subscriber table.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventKind, Arc<Vec<Subscriber>>>>>,
}

/// A live subscription; drop it (or let the handler task end) to detach.
pub struct EventReceiver {
    pub kind: EventKind,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers `handler` for events of `kind`. The handler runs on a
    /// dedicated task, isolated from panics in other handlers and from
    /// backpressure in `publish`.
    pub fn subscribe(&self, kind: EventKind, handler: HandlerFn) -> EventReceiver {
        let (tx, mut rx) = mpsc::channel::<Event>(SUBSCRIBER_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let handler = AssertUnwindSafe(&handler);
                if let Err(panic) = catch_unwind(move || (handler.0)(event)) {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(kind = %kind, %msg, "event bus handler panicked");
                }
            }
        });

        let mut subs = self.subscribers.write();
        let entry = subs.entry(kind).or_insert_with(|| Arc::new(Vec::new()));
        let mut next: Vec<Subscriber> = (**entry).iter().map(Subscriber::share).collect();
        next.push(Subscriber {
            sender: tx,
            dropped,
        });
        *entry = Arc::new(next);

        EventReceiver { kind }
    }

    /// Publishes `event` to every subscriber of `event.kind`, never blocking.
    pub fn publish(&self, event: Event) {
        let kind = event.kind;
        let subs = {
            let table = self.subscribers.read();
            table.get(&kind).cloned()
        };
        let Some(subs) = subs else {
            return;
        };
        for sub in subs.iter() {
            if sub.sender.try_send(event.clone()).is_err() {
                let total = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total.is_power_of_two() {
                    warn!(kind = %kind, total_dropped = total, "event bus subscriber full, dropping event");
                }
            }
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .get(&kind)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl Subscriber {
    fn share(&self) -> Subscriber {
        Subscriber {
            sender: self.sender.clone(),
            dropped: self.dropped.clone(),
        }
    }
}
