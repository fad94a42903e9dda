// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded ring buffer of log entries, shared across every supervised
//! process, with search, follow-streaming, and URL-mapping detection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use fm_core::{Clock, Event, EventBus, EventKind, LogEntry, LogLevel, LogSource, ProcessId, UrlMapping};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

use crate::url_detect;

/// Default ring capacity for the whole store, matching the convention
/// observed in comparable process-supervisor log buffers.
pub const DEFAULT_CAPACITY: usize = 10_000;

const FOLLOW_CHANNEL_CAPACITY: usize = 1_024;

struct Ring {
    entries: VecDeque<LogEntry>,
    next_id: u64,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            next_id: 0,
            capacity,
        }
    }

    fn push(&mut self, mut entry: LogEntry) -> LogEntry {
        entry.id = self.next_id;
        self.next_id += 1;
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }
}

/// Filters applied by `LogStore::search`/`stream`.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub process_id: Option<ProcessId>,
    pub level: Option<LogLevel>,
    pub since_id: Option<u64>,
    pub regex: Option<String>,
    pub limit: Option<usize>,
}

/// One item yielded by a `stream` call: either a backlog entry or a live one.
#[derive(Debug, Clone)]
pub enum StreamedLog {
    Backlog(LogEntry),
    Live(LogEntry),
}

/// A single ring shared by every process, plus the URL mappings detected
/// from lines passing through it.
///
/// Whether capacity should be per-process or global is not specified by the
/// contract this store implements; the existing behavior treats it as
/// global, and that is preserved here — one ring, one monotonic id space,
/// for the whole `LogStore` instance.
pub struct LogStore {
    ring: Mutex<Ring>,
    url_mappings: Mutex<HashMap<String, UrlMapping>>,
    follow: broadcast::Sender<LogEntry>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl LogStore {
    pub fn new(clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self::with_capacity(clock, event_bus, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, event_bus: EventBus, capacity: usize) -> Self {
        let (follow, _) = broadcast::channel(FOLLOW_CHANNEL_CAPACITY);
        Self {
            ring: Mutex::new(Ring::new(capacity)),
            url_mappings: Mutex::new(HashMap::new()),
            follow,
            event_bus,
            clock,
        }
    }

    /// Appends a line, assigning it the next store-wide monotonic id, fans
    /// it out to any active `stream(follow = true)` readers, and extracts
    /// any URLs it contains.
    pub fn add(&self, process_id: ProcessId, source: LogSource, content: String, level: LogLevel) -> LogEntry {
        let entry = LogEntry {
            id: 0,
            process_id: process_id.clone(),
            source,
            level,
            content,
            timestamp_ms: self.clock.now_ms(),
        };
        let stored = {
            let mut ring = self.ring.lock();
            ring.push(entry)
        };
        self.detect_urls(&process_id, &stored);
        // A lagging or absent follower is not an error; broadcast just drops.
        let _ = self.follow.send(stored.clone());
        stored
    }

    /// Extracts URLs from `entry.content`, upserting a `UrlMapping` per
    /// distinct URL and publishing `url.detected` the first time each one
    /// is seen.
    fn detect_urls(&self, process_id: &ProcessId, entry: &LogEntry) {
        for (url, label) in url_detect::detect_urls(&entry.content, process_id.as_str()) {
            let is_new = {
                let mut mappings = self.url_mappings.lock();
                if mappings.contains_key(&url) {
                    false
                } else {
                    mappings.insert(
                        url.clone(),
                        UrlMapping {
                            process_id: process_id.clone(),
                            url: url.clone(),
                            proxy_url: None,
                            label,
                            detected_at_ms: entry.timestamp_ms,
                        },
                    );
                    true
                }
            };
            if is_new {
                self.event_bus.publish(Event::new(
                    EventKind::UrlDetected,
                    Some(process_id.clone()),
                    entry.timestamp_ms,
                    json!({ "url": url }),
                ));
            }
        }
    }

    /// Records that `original_url` is now served through `proxy_url`.
    pub fn update_proxy_url(&self, original_url: &str, proxy_url: &str) -> Result<(), fm_core::Error> {
        let mut mappings = self.url_mappings.lock();
        let mapping = mappings
            .get_mut(original_url)
            .ok_or_else(|| fm_core::Error::NotFound(original_url.to_string()))?;
        mapping.proxy_url = Some(proxy_url.to_string());
        Ok(())
    }

    /// Every URL mapping detected so far, in no particular order.
    pub fn url_mappings(&self) -> Vec<UrlMapping> {
        self.url_mappings.lock().values().cloned().collect()
    }

    /// Returns matching entries, newest-first.
    pub fn search(&self, query: &LogQuery) -> Result<Vec<LogEntry>, fm_core::Error> {
        let compiled = query
            .regex
            .as_ref()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| fm_core::Error::InvalidArgument(format!("invalid regex: {e}")))
            })
            .transpose()?;

        let mut snapshot: Vec<LogEntry> = self.ring.lock().entries.iter().cloned().collect();

        snapshot.retain(|entry| {
            if let Some(pid) = &query.process_id {
                if &entry.process_id != pid {
                    return false;
                }
            }
            if let Some(level) = query.level {
                if entry.level != level {
                    return false;
                }
            }
            if let Some(since) = query.since_id {
                if entry.id <= since {
                    return false;
                }
            }
            if let Some(re) = &compiled {
                if !re.is_match(&entry.content) {
                    return false;
                }
            }
            true
        });

        snapshot.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = query.limit {
            snapshot.truncate(limit);
        }
        Ok(snapshot)
    }

    /// Returns the matching backlog plus, when `follow` is set, a receiver
    /// of subsequent matching lines.
    pub fn stream(
        &self,
        query: &LogQuery,
        follow: bool,
    ) -> Result<(Vec<LogEntry>, Option<broadcast::Receiver<LogEntry>>), fm_core::Error> {
        let mut backlog = self.search(query)?;
        backlog.reverse(); // oldest-first for a stream backlog
        let receiver = follow.then(|| self.follow.subscribe());
        Ok((backlog, receiver))
    }

    pub fn len(&self, process_id: &ProcessId) -> usize {
        self.ring.lock().entries.iter().filter(|e| &e.process_id == process_id).count()
    }

    pub fn is_empty(&self, process_id: &ProcessId) -> bool {
        self.len(process_id) == 0
    }
}

/// Applies a broadcast-lag warning once per overflow, matching the Event
/// Bus's rate-limited drop-warning convention.
pub fn warn_on_lag(skipped: u64) {
    warn!(skipped, "log stream follower lagged, entries skipped");
}
