pub mod chat;
pub mod prompt;

pub use chat::{ChatError, ChatService, DEFAULT_FALLBACK_REPLY};
pub use prompt::{build, SYSTEM_PROMPT};
