//! In-memory session store implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::history::DEFAULT_HISTORY_CAPACITY;
use super::traits::{SessionHandle, SessionStore, Turn};

/// An in-memory session store backed by a mutex-protected hash map.
///
/// The map lock only covers lookup and insertion; each session's history has
/// its own async lock, so a slow request never stalls other sessions.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    capacity: usize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock();
        if let Some(handle) = sessions.get(session_id) {
            return handle.clone();
        }

        let handle = SessionHandle::new(session_id, self.capacity);
        sessions.insert(session_id.to_string(), handle.clone());
        tracing::debug!(
            session_id,
            sessions = sessions.len(),
            "Allocated session history"
        );
        handle
    }

    async fn snapshot(&self, session_id: &str) -> Option<Vec<Turn>> {
        let handle = self.sessions.lock().get(session_id).cloned()?;
        let history = handle.lock().await;
        Some(history.to_vec())
    }

    fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
