// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance connection state machine and session-to-instance routing.
//!
//! One `ManagedConnection` per discovered peer: a `reqwest::Client` plus
//! the `fm_core::connection::InstanceConnection` state-machine snapshot.
//! `ConnectionManager` owns the full set and the session routing table;
//! callers never see a half-updated connection because every mutation
//! goes through `transition`, which is only ever called while holding the
//! per-connection lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fm_core::connection::{ConnectionState, InstanceConnection};
use fm_core::{ConnectionId, Instance, InstanceId, SessionId};
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// One tracked peer: its announcement data, live HTTP client, and state.
pub struct ManagedConnection {
    pub instance: Instance,
    pub client: reqwest::Client,
    state: Mutex<InstanceConnection>,
}

impl ManagedConnection {
    // The only failure mode for this builder is a process-wide TLS/DNS
    // misconfiguration that would break every `reqwest::Client` in the
    // binary, not something a caller of `new` could recover from.
    #[allow(clippy::expect_used)]
    fn new(instance: Instance, now_ms: i64) -> Self {
        let id = ConnectionId::new(Uuid::new_v4().to_string());
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            state: Mutex::new(InstanceConnection::new(id, instance.id.clone(), now_ms)),
            instance,
        }
    }

    pub fn snapshot(&self) -> InstanceConnection {
        self.state.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().state
    }

    pub(crate) fn transition(&self, to: ConnectionState, at_ms: i64, reason: Option<String>) {
        self.state.lock().transition(to, at_ms, reason);
    }

    pub fn next_backoff_ms(&self) -> Option<u64> {
        self.state.lock().next_backoff_ms()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.instance.port)
    }
}

/// All known peer connections plus session routing. Cloning is cheap: the
/// inner tables are `Arc`-shared.
#[derive(Clone)]
pub struct ConnectionManager {
    connections: Arc<DashMap<InstanceId, Arc<ManagedConnection>>>,
    sessions: Arc<DashMap<SessionId, InstanceId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Registers a newly discovered instance, or refreshes the announcement
    /// data of one already known (leaving its connection state untouched).
    pub fn upsert_discovered(&self, instance: Instance, now_ms: i64) -> Arc<ManagedConnection> {
        if let Some(existing) = self.connections.get(&instance.id) {
            return existing.clone();
        }
        let conn = Arc::new(ManagedConnection::new(instance, now_ms));
        self.connections.insert(conn.instance.id.clone(), conn.clone());
        conn
    }

    /// Drops a connection no longer present in the discovery set, clearing
    /// any sessions that were bound to it.
    pub fn remove(&self, id: &InstanceId) {
        self.connections.remove(id);
        self.sessions.retain(|_, bound| bound != id);
    }

    pub fn get(&self, id: &InstanceId) -> Option<Arc<ManagedConnection>> {
        self.connections.get(id).map(|e| e.value().clone())
    }

    pub fn list(&self) -> Vec<InstanceConnection> {
        self.connections.iter().map(|e| e.snapshot()).collect()
    }

    /// Attempts to bring a discovered/retrying connection to `active`.
    /// On failure, transitions to `retrying` (or `dead` once the backoff
    /// schedule is exhausted) and returns the error.
    pub async fn try_connect(&self, id: &InstanceId, now_ms: i64) -> Result<(), fm_core::Error> {
        let Some(conn) = self.get(id) else {
            return Err(fm_core::Error::NotFound(id.to_string()));
        };
        conn.transition(ConnectionState::Connecting, now_ms, None);

        let url = format!("{}/health", conn.base_url());
        match conn.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                conn.transition(ConnectionState::Active, now_ms, None);
                info!(id = %conn.instance.id, "peer connection established");
                Ok(())
            }
            Ok(resp) => {
                let reason = format!("health check returned {}", resp.status());
                self.fail(&conn, now_ms, reason.clone());
                Err(fm_core::Error::Transport(reason))
            }
            Err(e) => {
                self.fail(&conn, now_ms, e.to_string());
                Err(fm_core::Error::Transport(e.to_string()))
            }
        }
    }

    fn fail(&self, conn: &ManagedConnection, now_ms: i64, reason: String) {
        if conn.next_backoff_ms().is_some() {
            conn.transition(ConnectionState::Retrying, now_ms, Some(reason));
        } else {
            conn.transition(ConnectionState::Dead, now_ms, Some(reason));
            warn!(id = %conn.instance.id, "connection marked dead after exhausting retry schedule");
            self.sessions.retain(|_, bound| bound != &conn.instance.id);
        }
    }

    /// Binds `session` to `instance`, replacing any prior binding.
    pub fn connect_session(&self, session: SessionId, instance: InstanceId) {
        self.sessions.insert(session, instance);
    }

    pub fn disconnect_session(&self, session: &SessionId) {
        self.sessions.remove(session);
    }

    pub fn session_instance(&self, session: &SessionId) -> Option<InstanceId> {
        self.sessions.get(session).map(|e| e.value().clone())
    }

    /// Resolves the connection a hub tool call should use: an explicit
    /// `instance_id` wins over the session's bound instance. Returns
    /// `NotConnected` without making any network call if resolution fails
    /// or the resolved connection is not `active`.
    pub fn resolve_active(
        &self,
        explicit_instance: Option<&InstanceId>,
        session: Option<&SessionId>,
    ) -> Result<Arc<ManagedConnection>, fm_core::Error> {
        let instance_id = explicit_instance
            .cloned()
            .or_else(|| session.and_then(|s| self.session_instance(s)));

        let Some(instance_id) = instance_id else {
            return Err(fm_core::Error::NotConnected("no instance bound to this session".into()));
        };
        let Some(conn) = self.get(&instance_id) else {
            return Err(fm_core::Error::NotConnected(format!("unknown instance: {instance_id}")));
        };
        if conn.state() != ConnectionState::Active {
            return Err(fm_core::Error::NotConnected(format!(
                "instance {instance_id} is not active (state = {})",
                conn.state()
            )));
        }
        Ok(conn)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_core::ProcessInfo;

    fn sample(id: &str, port: u16) -> Instance {
        Instance {
            id: InstanceId::new(id),
            name: "demo".into(),
            directory: "/tmp".into(),
            port,
            started_at_ms: 0,
            last_ping_ms: 0,
            process_info: ProcessInfo { pid: 1, executable: "/bin/demo".into() },
            version: "0.1.0".into(),
        }
    }

    #[test]
    fn upsert_is_idempotent_for_known_instance() {
        let mgr = ConnectionManager::new();
        let first = mgr.upsert_discovered(sample("i1", 1), 0);
        let second = mgr.upsert_discovered(sample("i1", 1), 0);
        assert_eq!(first.instance.id, second.instance.id);
        assert_eq!(mgr.list().len(), 1);
    }

    #[test]
    fn resolve_active_fails_without_binding() {
        let mgr = ConnectionManager::new();
        mgr.upsert_discovered(sample("i1", 1), 0);
        let err = mgr.resolve_active(None, None).unwrap_err();
        assert_eq!(err.kind(), "not_connected");
    }

    #[test]
    fn resolve_active_fails_when_not_active() {
        let mgr = ConnectionManager::new();
        mgr.upsert_discovered(sample("i1", 1), 0);
        let err = mgr.resolve_active(Some(&InstanceId::new("i1")), None).unwrap_err();
        assert_eq!(err.kind(), "not_connected");
    }

    #[test]
    fn explicit_instance_id_wins_over_session_binding() {
        let mgr = ConnectionManager::new();
        let conn = mgr.upsert_discovered(sample("i1", 1), 0);
        conn.transition(ConnectionState::Connecting, 0, None);
        conn.transition(ConnectionState::Active, 0, None);
        mgr.connect_session(SessionId::new("s1"), InstanceId::new("other"));

        let resolved = mgr.resolve_active(Some(&InstanceId::new("i1")), Some(&SessionId::new("s1"))).unwrap();
        assert_eq!(resolved.instance.id, InstanceId::new("i1"));
    }

    #[test]
    fn remove_clears_bound_sessions() {
        let mgr = ConnectionManager::new();
        mgr.upsert_discovered(sample("i1", 1), 0);
        mgr.connect_session(SessionId::new("s1"), InstanceId::new("i1"));
        mgr.remove(&InstanceId::new("i1"));
        assert!(mgr.session_instance(&SessionId::new("s1")).is_none());
    }

    #[test]
    fn failing_connect_exhausts_backoff_into_dead() {
        let mgr = ConnectionManager::new();
        let conn = mgr.upsert_discovered(sample("i1", 1), 0);
        for _ in 0..5 {
            mgr.fail(&conn, 0, "boom".into());
        }
        assert_eq!(conn.state(), ConnectionState::Dead);
    }
}
