// ============================
// crates/autologin-lib/src/auth/session.rs
// ============================
//! Session state holders and the server-side session registry.
use super::token_generator::generate_secure_token;
use crate::metrics::{SESSION_ACTIVE, SESSION_EXPIRED};
use async_trait::async_trait;
use autologin_common::SessionSnapshot;
use dashmap::{mapref::entry::Entry, DashMap};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Default absolute session lifetime
pub const SESSION_ABSOLUTE_TTL: Duration = Duration::from_secs(60 * 60 * 24); // 24 hours

/// Default idle timeout
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60 * 2); // 2 hours

/// Transient per-agent authentication state, supplied by the environment
#[async_trait]
pub trait SessionState: Send + Sync {
    /// Current snapshot; logged out when nothing is stored
    async fn snapshot(&self) -> SessionSnapshot;

    async fn store(&self, snapshot: SessionSnapshot);

    /// Drop everything held for this agent
    async fn destroy(&self);
}

/// Session state for a single agent held in memory
#[derive(Debug, Default)]
pub struct MemorySession {
    snapshot: Mutex<Option<SessionSnapshot>>,
    destroyed: Mutex<u32>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `destroy` was called
    pub fn destroy_count(&self) -> u32 {
        *self.destroyed.lock()
    }
}

#[async_trait]
impl SessionState for MemorySession {
    async fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.lock().clone().unwrap_or_default()
    }

    async fn store(&self, snapshot: SessionSnapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }

    async fn destroy(&self) {
        *self.snapshot.lock() = None;
        *self.destroyed.lock() += 1;
    }
}

/// Session information kept by the registry
#[derive(Debug, Clone)]
struct SessionEntry {
    snapshot: SessionSnapshot,
    created_at: Instant,
    last_active: Instant,
}

/// Server-side session registry keyed by random session ids
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, SessionEntry>>,
    absolute_ttl: Duration,
    idle_ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self::new_with_timeouts(SESSION_ABSOLUTE_TTL, SESSION_IDLE_TTL)
    }

    /// Create a new session manager with custom timeouts
    pub fn new_with_timeouts(absolute_ttl: Duration, idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            absolute_ttl,
            idle_ttl,
        }
    }

    /// Attach to the session named by `id`, or start a new one when it is
    /// missing or expired.
    ///
    /// A new session only enters the registry on its first `store`, so
    /// anonymous requests leave nothing behind.
    pub fn open(&self, id: Option<&str>) -> ManagedSession {
        if let Some(id) = id {
            if self.touch(id) {
                return ManagedSession {
                    manager: self.clone(),
                    id: id.to_string(),
                    is_new: false,
                };
            }
        }

        ManagedSession {
            manager: self.clone(),
            id: generate_secure_token(),
            is_new: true,
        }
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.duration_since(entry.created_at) >= self.absolute_ttl
            || now.duration_since(entry.last_active) >= self.idle_ttl
    }

    /// Refresh the idle timer; false when the session is gone or expired
    fn touch(&self, id: &str) -> bool {
        let now = Instant::now();
        if let Some(mut entry) = self.sessions.get_mut(id) {
            if !self.is_expired(&entry, now) {
                entry.last_active = now;
                return true;
            }
        } else {
            return false;
        }
        counter!(SESSION_EXPIRED).increment(1);
        self.remove(id);
        false
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Get a session snapshot by id
    pub fn get(&self, id: &str) -> Option<SessionSnapshot> {
        let now = Instant::now();
        self.sessions
            .get(id)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.snapshot.clone())
    }

    fn put(&self, id: &str, snapshot: SessionSnapshot) {
        let now = Instant::now();
        let inserted = match self.sessions.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                entry.snapshot = snapshot;
                entry.last_active = now;
                false
            },
            Entry::Vacant(entry) => {
                entry.insert(SessionEntry {
                    snapshot,
                    created_at: now,
                    last_active: now,
                });
                true
            },
        };
        if inserted {
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
        }
    }

    /// Remove a session by id
    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
        gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
    }

    /// Remove expired sessions, returning how many were dropped
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = Instant::now();
        let before_count = self.sessions.len();
        self.sessions.retain(|_, entry| !self.is_expired(entry, now));
        let after_count = self.sessions.len();
        let removed = before_count.saturating_sub(after_count);

        if removed > 0 {
            counter!(SESSION_EXPIRED).increment(removed as u64);
        }
        gauge!(SESSION_ACTIVE).set(after_count as f64);
        removed
    }

    /// Return count of active sessions
    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// One agent's view into the `SessionManager`
#[derive(Debug, Clone)]
pub struct ManagedSession {
    manager: SessionManager,
    id: String,
    is_new: bool,
}

impl ManagedSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Started by this request rather than named by the client
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether the id must still be handed to the client: the session is new
    /// and something was stored in it
    pub fn needs_cookie(&self) -> bool {
        self.is_new && self.manager.contains(&self.id)
    }
}

#[async_trait]
impl SessionState for ManagedSession {
    async fn snapshot(&self) -> SessionSnapshot {
        self.manager.get(&self.id).unwrap_or_default()
    }

    async fn store(&self, snapshot: SessionSnapshot) {
        self.manager.put(&self.id, snapshot);
    }

    async fn destroy(&self) {
        self.manager.remove(&self.id);
    }
}
