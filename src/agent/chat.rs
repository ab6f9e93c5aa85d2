//! Per-request chat flow: record the user turn, ask the provider, record the reply.

use std::sync::Arc;

use crate::providers::{sanitize_api_error, CompletionOptions, Provider};
use crate::sessions::{SessionStore, Turn};

use super::prompt;

/// Reply recorded and returned when the completion service produces no choices.
pub const DEFAULT_FALLBACK_REPLY: &str = "Sorry, no response.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The caller sent no message text. Nothing was recorded.
    #[error("No message provided")]
    EmptyMessage,
    /// The completion service failed; no retry was attempted.
    #[error("completion request failed: {0}")]
    Upstream(#[source] anyhow::Error),
}

/// Wires a session store to a completion provider.
pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    options: CompletionOptions,
    fallback_reply: String,
}

impl ChatService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            sessions,
            provider,
            options,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }

    pub fn with_fallback_reply(mut self, fallback_reply: impl Into<String>) -> Self {
        self.fallback_reply = fallback_reply.into();
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Answer `message` within `session_id`'s conversation.
    ///
    /// The session stays locked from the user append until the assistant
    /// append, so concurrent requests on one session cannot interleave.
    pub async fn respond(&self, session_id: &str, message: &str) -> Result<String, ChatError> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let session = self.sessions.get_or_create(session_id);
        let mut history = session.lock().await;

        if history.append(Turn::user(message)).is_some() {
            tracing::debug!(session_id, "Evicted oldest turn");
        }

        let messages = prompt::build(&history);
        tracing::debug!(
            session_id,
            history_len = history.len(),
            model = %self.options.model,
            "Sending completion request"
        );

        let reply = match self.provider.complete(&messages, &self.options).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!(
                    session_id,
                    provider = self.provider.name(),
                    "Completion returned no choices; using fallback reply"
                );
                self.fallback_reply.clone()
            }
            Err(e) => {
                tracing::warn!(
                    session_id,
                    provider = self.provider.name(),
                    error = %sanitize_api_error(&e.to_string()),
                    "Completion request failed"
                );
                return Err(ChatError::Upstream(e));
            }
        };

        if history.append(Turn::assistant(reply.clone())).is_some() {
            tracing::debug!(session_id, "Evicted oldest turn");
        }

        Ok(reply)
    }
}
