//! Session management: per-session bounded chat history.

pub mod history;
pub mod in_memory;
pub mod traits;

pub use history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
pub use in_memory::InMemorySessionStore;
pub use traits::{Role, SessionHandle, SessionStore, Turn};

use std::sync::Arc;

/// Create an in-memory session store with the given per-session capacity.
pub fn create_session_store(capacity: usize) -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::with_capacity(capacity))
}
