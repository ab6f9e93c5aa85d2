//! Completion provider trait and request options.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sessions::Turn;

pub const DEFAULT_MODEL: &str = "qwen/qwen3-next-80b-a3b-instruct";
pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_TOP_P: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// A chat-completion backend.
///
/// Implementations make exactly one non-streaming request per call and do not
/// retry.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send `messages` in order and return the first choice's text.
    ///
    /// `Ok(None)` means the service answered but produced no choices.
    async fn complete(
        &self,
        messages: &[Turn],
        options: &CompletionOptions,
    ) -> anyhow::Result<Option<String>>;

    fn name(&self) -> &str;
}
