//! Session Registry
//!
//! Keeps live remote sessions addressable by an opaque identifier so a client
//! that navigates away can reattach from a new transport.
//!
//! A session is either attached (owned by a gateway) or detached (parked
//! after a navigation-disconnect). Only detached sessions age out: each one
//! is restorable until `expires_at`, enforced by a one-shot timer per session
//! and backed up by a periodic sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use session_relay_core::{
    ConnectionConfig, FileBrowserState, RelayError, RelayResult, TerminalState,
};
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session_adapter::RemoteSessionAdapter;
use super::types::SessionSummary;
use crate::models::settings::RestorePolicy;

/// Delay past the deadline before a timer evicts; `expires_at` itself is
/// still restorable.
const EXPIRY_GRACE: Duration = Duration::from_millis(1);

struct Session {
    id: String,
    /// Transport currently attached, `None` while parked
    transport_id: Option<String>,
    last_transport_id: String,
    adapter: Arc<RemoteSessionAdapter>,
    config: ConnectionConfig,
    created_at: DateTime<Utc>,
    expires_at: Instant,
    terminal_state: Option<TerminalState>,
    file_browser_state: Option<FileBrowserState>,
    expiry_timer: Option<AbortHandle>,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        self.transport_id.is_none() && now > self.expires_at
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.expiry_timer.take() {
            timer.abort();
        }
    }
}

/// A session handed over to a gateway by [`SessionRegistry::restore`].
pub struct RestoredSession {
    pub session_id: String,
    pub adapter: Arc<RemoteSessionAdapter>,
    pub terminal_state: Option<TerminalState>,
    pub file_browser_state: Option<FileBrowserState>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    policy: RestorePolicy,
}

/// Shared, concurrency-safe session map.
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
    sweeper: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration, policy: RestorePolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                ttl,
                policy,
            }),
            sweeper: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn policy(&self) -> RestorePolicy {
        self.inner.policy
    }

    /// Start the periodic sweep. A second call restarts it.
    pub fn start(&self, interval: Duration) {
        self.stop();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = inner.upgrade() else { break };
                        let evicted = sweep_sessions(&inner).await;
                        if evicted > 0 {
                            info!(evicted, "session sweep reclaimed expired sessions");
                        }
                    }
                }
            }
            debug!("session sweep stopped");
        });

        if let Ok(mut sweeper) = self.sweeper.lock() {
            *sweeper = Some((cancel, handle));
        }
        info!(interval_secs = interval.as_secs(), "session sweep started");
    }

    /// Stop the periodic sweep. Sessions and their timers are left alone.
    pub fn stop(&self) {
        let sweeper = self.sweeper.lock().ok().and_then(|mut s| s.take());
        if let Some((cancel, handle)) = sweeper {
            cancel.cancel();
            handle.abort();
        }
    }

    /// Stop sweeping and close every session.
    pub async fn shutdown(&self) {
        self.stop();
        let drained: Vec<Session> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        let count = drained.len();
        close_all(drained).await;
        info!(count, "session registry shut down");
    }

    /// Register a freshly connected adapter, attached to `transport_id`.
    pub async fn preserve(
        &self,
        transport_id: &str,
        adapter: Arc<RemoteSessionAdapter>,
        config: ConnectionConfig,
        terminal_state: Option<TerminalState>,
        file_browser_state: Option<FileBrowserState>,
    ) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let expires_at = Instant::now() + self.inner.ttl;

        let mut session = Session {
            id: session_id.clone(),
            transport_id: Some(transport_id.to_string()),
            last_transport_id: transport_id.to_string(),
            adapter,
            config,
            created_at: Utc::now(),
            expires_at,
            terminal_state,
            file_browser_state,
            expiry_timer: None,
        };
        session.expiry_timer = Some(arm_expiry(&self.inner, &session_id, expires_at));

        info!(
            session_id = %session_id,
            remote = %session.config.address(),
            "session preserved"
        );
        self.inner
            .sessions
            .write()
            .await
            .insert(session_id.clone(), session);
        session_id
    }

    /// Hand a session to `transport_id`, sliding its expiry forward.
    ///
    /// Snapshots are returned once and cleared.
    pub async fn restore(&self, session_id: &str, transport_id: &str) -> RelayResult<RestoredSession> {
        let now = Instant::now();
        let mut sessions = self.inner.sessions.write().await;

        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;

        if session.is_expired(now) || session.adapter.is_closed() {
            let stale = sessions.remove(session_id);
            drop(sessions);
            if let Some(stale) = stale {
                close_all(vec![stale]).await;
            }
            return Err(RelayError::SessionExpired(session_id.to_string()));
        }

        if self.inner.policy == RestorePolicy::OwnerOnly && session.last_transport_id != transport_id {
            return Err(RelayError::OwnerMismatch(session_id.to_string()));
        }

        if let Some(previous) = &session.transport_id {
            if previous != transport_id {
                info!(session_id, from = %previous, to = %transport_id, "session taken over");
            }
        }

        session.expires_at = now + self.inner.ttl;
        session.cancel_timer();
        session.expiry_timer = Some(arm_expiry(&self.inner, session_id, session.expires_at));
        session.transport_id = Some(transport_id.to_string());
        session.last_transport_id = transport_id.to_string();

        info!(session_id, transport_id, "session restored");
        Ok(RestoredSession {
            session_id: session.id.clone(),
            adapter: Arc::clone(&session.adapter),
            terminal_state: session.terminal_state.take(),
            file_browser_state: session.file_browser_state.take(),
        })
    }

    /// Park an attached session, storing the client's snapshots. The
    /// session stays restorable for a full TTL from now.
    pub async fn detach(
        &self,
        session_id: &str,
        transport_id: &str,
        terminal_state: Option<TerminalState>,
        file_browser_state: Option<FileBrowserState>,
    ) -> RelayResult<()> {
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;

        if session.transport_id.as_deref() != Some(transport_id) {
            return Err(RelayError::OwnerMismatch(session_id.to_string()));
        }

        session.transport_id = None;
        session.terminal_state = terminal_state;
        session.file_browser_state = file_browser_state;
        session.expires_at = session.expires_at.max(Instant::now() + self.inner.ttl);
        session.cancel_timer();
        session.expiry_timer = Some(arm_expiry(&self.inner, session_id, session.expires_at));

        info!(session_id, transport_id, "session detached");
        Ok(())
    }

    /// Evict and close the session only if `transport_id` was the last
    /// transport to hold it, attached or parked. The check and the removal
    /// happen under one write lock, so a concurrent restore either wins and
    /// keeps the session or finds it gone.
    pub async fn evict_if_owned(&self, session_id: &str, transport_id: &str) -> bool {
        let removed = {
            let mut sessions = self.inner.sessions.write().await;
            match sessions.get(session_id) {
                Some(session) if session.last_transport_id == transport_id => {
                    sessions.remove(session_id)
                }
                Some(session) => {
                    debug!(
                        session_id,
                        transport_id,
                        owner = %session.last_transport_id,
                        "session held by another transport; not evicting"
                    );
                    None
                }
                None => None,
            }
        };
        match removed {
            Some(session) => {
                close_all(vec![session]).await;
                true
            }
            None => false,
        }
    }

    /// Remove a session and close its adapter. Returns whether it existed.
    pub async fn evict(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                close_all(vec![session]).await;
                true
            }
            None => false,
        }
    }

    /// Evict every detached session past its expiry and every session whose
    /// remote side has closed.
    pub async fn sweep(&self) -> usize {
        sweep_sessions(&self.inner).await
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(session_id)
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.inner.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|s| SessionSummary {
                session_id: s.id.clone(),
                host: s.config.host.clone(),
                port: s.config.port,
                username: s.config.username.clone(),
                attached: s.transport_id.is_some(),
                created_at: s.created_at.to_rfc3339(),
                has_terminal_state: s.terminal_state.is_some(),
                has_file_browser_state: s.file_browser_state.is_some(),
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

fn arm_expiry(inner: &Arc<RegistryInner>, session_id: &str, deadline: Instant) -> AbortHandle {
    let inner = Arc::downgrade(inner);
    let session_id = session_id.to_string();
    tokio::spawn(expire_at(inner, session_id, deadline)).abort_handle()
}

async fn expire_at(inner: Weak<RegistryInner>, session_id: String, deadline: Instant) {
    tokio::time::sleep_until(deadline + EXPIRY_GRACE).await;
    let Some(inner) = inner.upgrade() else { return };

    let expired = {
        let mut sessions = inner.sessions.write().await;
        let due = sessions
            .get(&session_id)
            .is_some_and(|s| s.is_expired(Instant::now()));
        if due {
            sessions.remove(&session_id).map(|mut s| {
                // Dropping our own handle; aborting it would cancel this task.
                s.expiry_timer = None;
                s
            })
        } else {
            None
        }
    };

    if let Some(session) = expired {
        info!(session_id = %session.id, "session expired");
        close_all(vec![session]).await;
    }
}

async fn sweep_sessions(inner: &RegistryInner) -> usize {
    let now = Instant::now();
    let stale: Vec<Session> = {
        let mut sessions = inner.sessions.write().await;
        let ids: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(now) || s.adapter.is_closed())
            .map(|s| s.id.clone())
            .collect();
        ids.iter().filter_map(|id| sessions.remove(id)).collect()
    };
    let count = stale.len();
    close_all(stale).await;
    count
}

/// Close adapters outside the map lock. A failing or panicking close is
/// logged and does not stop the others.
async fn close_all(sessions: Vec<Session>) {
    for mut session in sessions {
        session.cancel_timer();
        let adapter = Arc::clone(&session.adapter);
        let session_id = session.id.clone();
        let closing = tokio::spawn(async move { adapter.close().await });
        if let Err(e) = closing.await {
            warn!(session_id = %session_id, "adapter close failed: {}", e);
        } else {
            debug!(session_id = %session_id, "session evicted");
        }
    }
}
