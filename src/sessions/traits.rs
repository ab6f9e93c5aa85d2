//! Session storage traits and types for chat conversation state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use super::history::BoundedHistory;

/// Speaker of a single turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation. Fields are private so a turn cannot be
/// edited after it has been recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Shared handle to one session's history.
///
/// Cloning is cheap; every clone guards the same history. Holding the guard
/// returned by [`SessionHandle::lock`] gives exclusive access to that session
/// only, so requests for other sessions keep running.
#[derive(Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    history: Arc<Mutex<BoundedHistory>>,
}

impl SessionHandle {
    pub(crate) fn new(id: &str, capacity: usize) -> Self {
        Self {
            id: Arc::from(id),
            history: Arc::new(Mutex::new(BoundedHistory::new(capacity))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for exclusive access to the session history.
    pub async fn lock(&self) -> MutexGuard<'_, BoundedHistory> {
        self.history.lock().await
    }

    /// True when both handles point at the same underlying history.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.history, &other.history)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// Process-lifetime storage for per-session chat histories.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the history handle for `session_id`, allocating an empty one
    /// on first sight. Sessions are never expired.
    fn get_or_create(&self, session_id: &str) -> SessionHandle;

    /// Copy of a session's turns (oldest first), or `None` if the id has
    /// never been seen.
    async fn snapshot(&self, session_id: &str) -> Option<Vec<Turn>>;

    /// Number of distinct sessions allocated so far.
    fn session_count(&self) -> usize;

    /// Per-session turn capacity.
    fn capacity(&self) -> usize;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
