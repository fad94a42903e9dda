// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MCP session lifecycle: one opaque id per connected client, tracking its
//! active resource subscriptions so a disconnect can tear them down.

use std::sync::Arc;

use dashmap::DashMap;
use fm_core::SessionId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub cancel: CancellationToken,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl SessionHandle {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self, resource_uri: impl Into<String>) {
        self.subscriptions.lock().push(resource_uri.into());
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

/// Live session table. Entries are removed on disconnect (stream future
/// drop or an explicit `DELETE /mcp`), at which point every subscription
/// that session held is implicitly gone.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> SessionHandle {
        let id = SessionId::new(Uuid::new_v4().to_string());
        let handle = SessionHandle::new(id.clone());
        self.sessions.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    /// Cancels the session's streaming task (if any) and drops its entry,
    /// which releases every resource subscription it held.
    pub fn remove(&self, id: &SessionId) {
        if let Some((_, handle)) = self.sessions.remove(id) {
            handle.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_roundtrips() {
        let store = SessionStore::new();
        let handle = store.create();
        assert!(store.get(&handle.id).is_some());
    }

    #[test]
    fn remove_cancels_and_drops_session() {
        let store = SessionStore::new();
        let handle = store.create();
        store.remove(&handle.id);
        assert!(store.get(&handle.id).is_none());
        assert!(handle.cancel.is_cancelled());
    }

    #[test]
    fn subscriptions_are_tracked_per_session() {
        let store = SessionStore::new();
        let handle = store.create();
        handle.subscribe("logs://p1");
        assert_eq!(handle.subscriptions(), vec!["logs://p1".to_string()]);
    }
}
