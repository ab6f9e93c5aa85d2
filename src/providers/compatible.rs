//! Generic OpenAI-compatible provider.
//! Most LLM APIs follow the same `/v1/chat/completions` format.
//! This module provides a single implementation that works for all of them.

use crate::providers::traits::{CompletionOptions, Provider};
use crate::sessions::Turn;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A provider that speaks the OpenAI-compatible chat completions API.
/// Used by: NVIDIA NIM, OpenAI, and any self-hosted `/chat/completions` endpoint.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| {
                self.base_url
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            });

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Turn> for Message<'a> {
    fn from(turn: &'a Turn) -> Self {
        Self {
            role: turn.role().as_str(),
            content: turn.content(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        messages: &[Turn],
        options: &CompletionOptions,
    ) -> anyhow::Result<Option<String>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Set CAMPINOVA_API_KEY or api_key in config.toml.",
                self.name
            )
        })?;

        let request = ChatRequest {
            model: &options.model,
            messages: messages.iter().map(Message::from).collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let url = self.chat_completions_url();
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "{} request failed: {}",
                    self.name,
                    super::sanitize_api_error(&e.to_string())
                )
            })?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let chat_response: ApiChatResponse = response.json().await.map_err(|e| {
            anyhow::anyhow!("{} returned a malformed completion: {e}", self.name)
        })?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_provider(name: &str, url: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(name, url, key, Duration::from_secs(5))
    }

    fn conversation() -> Vec<Turn> {
        vec![Turn::system("You are Campinova"), Turn::user("hello")]
    }

    #[test]
    fn creates_with_key() {
        let p = make_provider("nvidia", "https://integrate.api.nvidia.com/v1", Some("nv-key"));
        assert_eq!(p.name, "nvidia");
        assert_eq!(p.base_url, "https://integrate.api.nvidia.com/v1");
        assert_eq!(p.api_key.as_deref(), Some("nv-key"));
    }

    #[test]
    fn strips_trailing_slash() {
        let p = make_provider("test", "https://example.com/", None);
        assert_eq!(p.base_url, "https://example.com");
    }

    #[test]
    fn request_serializes_all_sampling_fields() {
        let turns = conversation();
        let options = CompletionOptions::default();
        let req = ChatRequest {
            model: &options.model,
            messages: turns.iter().map(Message::from).collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "qwen/qwen3-next-80b-a3b-instruct");
        assert_eq!(json["temperature"], 0.6);
        assert_eq!(json["top_p"], 0.7);
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn response_without_choices_field_deserializes_empty() {
        let resp: ApiChatResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(resp.choices.is_empty());
    }

    #[test]
    fn chat_completions_url_standard() {
        let p = make_provider("nvidia", "https://integrate.api.nvidia.com/v1", None);
        assert_eq!(
            p.chat_completions_url(),
            "https://integrate.api.nvidia.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_custom_full_endpoint() {
        let p = make_provider(
            "custom",
            "https://my-api.example.com/v2/llm/chat/completions",
            None,
        );
        assert_eq!(
            p.chat_completions_url(),
            "https://my-api.example.com/v2/llm/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_requires_exact_suffix_match() {
        let p = make_provider(
            "custom",
            "https://my-api.example.com/v2/llm/chat/completions-proxy",
            None,
        );
        assert_eq!(
            p.chat_completions_url(),
            "https://my-api.example.com/v2/llm/chat/completions-proxy/chat/completions"
        );
    }

    #[tokio::test]
    async fn complete_fails_without_key() {
        let p = make_provider("nvidia", "https://integrate.api.nvidia.com/v1", None);
        let result = p.complete(&conversation(), &CompletionOptions::default()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("nvidia API key not set"));
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen/qwen3-next-80b-a3b-instruct",
                "stream": false,
                "max_tokens": 4096,
                "messages": [
                    {"role": "system", "content": "You are Campinova"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "first"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = make_provider("test", &format!("{}/v1", server.uri()), Some("test-key"));
        let reply = p
            .complete(&conversation(), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn complete_reports_no_choices_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let p = make_provider("test", &server.uri(), Some("test-key"));
        let reply = p
            .complete(&conversation(), &CompletionOptions::default())
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn null_content_becomes_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let p = make_provider("test", &server.uri(), Some("test-key"));
        let reply = p
            .complete(&conversation(), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn upstream_error_is_sanitized_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string("invalid key nvapi-abcdef123456"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let p = make_provider("nvidia", &server.uri(), Some("nvapi-abcdef123456"));
        let err = p
            .complete(&conversation(), &CompletionOptions::default())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("nvidia API error (401"));
        assert!(err.contains("[REDACTED]"));
        assert!(!err.contains("nvapi-abcdef123456"));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let p = make_provider("test", &server.uri(), Some("test-key"));
        let err = p
            .complete(&conversation(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed completion"));
    }
}
