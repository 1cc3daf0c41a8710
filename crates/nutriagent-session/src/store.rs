use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nutriagent_core::{AgentError, AgentResult, Message};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot row returned by [`SessionStore::list_all`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Thread identifier.
    pub thread_id: String,
    /// Number of messages in the history.
    pub message_count: usize,
    /// Last append or turn start.
    pub last_activity: DateTime<Utc>,
}

/// Exclusive per-session turn permit.
///
/// Held by the orchestrator for the duration of one turn; holding it makes
/// a concurrent [`SessionStore::begin_turn`] for the same thread fail fast
/// with [`AgentError::SessionBusy`]. Dropping the guard releases the
/// session.
#[derive(Debug)]
pub struct TurnGuard {
    _permit: OwnedMutexGuard<()>,
}

/// Storage for conversation sessions.
///
/// All mutations are visible to subsequent reads within the process; no
/// cross-process durability is implied.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolves a thread identifier, creating the session when needed.
    ///
    /// A supplied, known id is returned untouched (idempotent — the history
    /// is never reset). A supplied, unknown id creates an empty session
    /// under that identifier. `None` generates a fresh identifier.
    async fn ensure(&self, thread_id: Option<&str>) -> AgentResult<String>;

    /// Appends to the tail of the ordered history.
    async fn append(&self, thread_id: &str, message: Message) -> AgentResult<()>;

    /// Returns the full ordered history.
    async fn history(&self, thread_id: &str) -> AgentResult<Vec<Message>>;

    /// Removes the session entirely. Clearing an unknown session is a
    /// no-op.
    async fn clear(&self, thread_id: &str) -> AgentResult<()>;

    /// Snapshot of every live session.
    async fn list_all(&self) -> AgentResult<Vec<SessionSummary>>;

    /// Acquires the exclusive turn permit for a session, failing fast with
    /// [`AgentError::SessionBusy`] when a turn is already in flight.
    async fn begin_turn(&self, thread_id: &str) -> AgentResult<TurnGuard>;
}

struct SessionEntry {
    session: Session,
    turn_lock: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn new(thread_id: &str) -> Self {
        Self {
            session: Session::new(thread_id),
            turn_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// In-memory session store bounded by a session-count capacity.
///
/// When creating a session would exceed the capacity, the
/// least-recently-active session without a turn in flight is evicted.
/// Sessions holding a turn permit are never evicted, so the map can
/// transiently exceed the capacity by at most the number of concurrently
/// running turns.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    capacity: usize,
}

/// Default maximum number of live sessions.
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

impl MemorySessionStore {
    /// Creates a store with [`DEFAULT_SESSION_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }

    /// Creates a store bounded to `capacity` live sessions (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Must be called with the write lock held. Evicts the
    /// least-recently-active idle session if the map is at capacity.
    fn evict_if_full(sessions: &mut HashMap<String, SessionEntry>, capacity: usize) {
        if sessions.len() < capacity {
            return;
        }
        let victim = sessions
            .iter()
            .filter(|(_, entry)| entry.turn_lock.try_lock().is_ok())
            .min_by_key(|(_, entry)| entry.session.updated_at)
            .map(|(id, _)| id.clone());

        match victim {
            Some(id) => {
                sessions.remove(&id);
                warn!(thread_id = %id, "Evicted least-recently-active session");
            }
            None => {
                // Every session has a turn in flight; exceed capacity
                // transiently rather than evict under a live writer.
                debug!("Session capacity reached with all sessions busy");
            }
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn ensure(&self, thread_id: Option<&str>) -> AgentResult<String> {
        if let Some(id) = thread_id {
            {
                let sessions = self.sessions.read();
                if sessions.contains_key(id) {
                    return Ok(id.to_string());
                }
            }
            let mut sessions = self.sessions.write();
            // Re-check under the write lock; another caller may have won.
            if !sessions.contains_key(id) {
                Self::evict_if_full(&mut sessions, self.capacity);
                sessions.insert(id.to_string(), SessionEntry::new(id));
                debug!(thread_id = %id, "Created session");
            }
            Ok(id.to_string())
        } else {
            let id = Uuid::new_v4().to_string();
            let mut sessions = self.sessions.write();
            Self::evict_if_full(&mut sessions, self.capacity);
            sessions.insert(id.clone(), SessionEntry::new(&id));
            debug!(thread_id = %id, "Created session with generated id");
            Ok(id)
        }
    }

    async fn append(&self, thread_id: &str, message: Message) -> AgentResult<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(thread_id)
            .ok_or_else(|| AgentError::UnknownSession(thread_id.to_string()))?;
        entry.session.add_message(message);
        Ok(())
    }

    async fn history(&self, thread_id: &str) -> AgentResult<Vec<Message>> {
        let sessions = self.sessions.read();
        sessions
            .get(thread_id)
            .map(|entry| entry.session.messages.clone())
            .ok_or_else(|| AgentError::UnknownSession(thread_id.to_string()))
    }

    async fn clear(&self, thread_id: &str) -> AgentResult<()> {
        let removed = self.sessions.write().remove(thread_id);
        if removed.is_some() {
            debug!(thread_id = %thread_id, "Cleared session");
        }
        Ok(())
    }

    async fn list_all(&self) -> AgentResult<Vec<SessionSummary>> {
        let sessions = self.sessions.read();
        Ok(sessions
            .values()
            .map(|entry| SessionSummary {
                thread_id: entry.session.thread_id.clone(),
                message_count: entry.session.message_count(),
                last_activity: entry.session.updated_at,
            })
            .collect())
    }

    async fn begin_turn(&self, thread_id: &str) -> AgentResult<TurnGuard> {
        let turn_lock = {
            let mut sessions = self.sessions.write();
            let entry = sessions
                .get_mut(thread_id)
                .ok_or_else(|| AgentError::UnknownSession(thread_id.to_string()))?;
            entry.session.updated_at = Utc::now();
            Arc::clone(&entry.turn_lock)
        };

        match turn_lock.try_lock_owned() {
            Ok(permit) => Ok(TurnGuard { _permit: permit }),
            Err(_) => Err(AgentError::SessionBusy(thread_id.to_string())),
        }
    }
}
