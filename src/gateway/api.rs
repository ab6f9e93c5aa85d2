//! HTTP handlers for the chat gateway.

use super::AppState;
use crate::agent::ChatError;
use crate::providers::sanitize_api_error;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
}

/// Pull the `message` field out of a raw request body.
///
/// Only a JSON object with a string `message` counts. Malformed JSON, arrays,
/// scalars, and null or non-string values all yield `None`.
pub fn extract_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .as_object()?
        .get("message")?
        .as_str()
        .map(ToString::to_string)
}

/// Session id from `X-Session-ID`, used verbatim. Absent or non-UTF-8 headers
/// fall back to `default`.
pub fn session_id_from_headers<'a>(headers: &'a HeaderMap, default: &'a str) -> &'a str {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default)
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ChatError::EmptyMessage => (StatusCode::BAD_REQUEST, self.to_string()),
            ChatError::Upstream(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                sanitize_api_error(&e.to_string()),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// POST /api/chat: answer one message within the caller's session
pub async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatReply>, ChatError> {
    let session_id = session_id_from_headers(&headers, &state.default_session_id);
    let message = extract_message(&body).unwrap_or_default();

    let response = state.chat.respond(session_id, &message).await?;
    Ok(Json(ChatReply { response }))
}

/// GET /health: liveness plus a few counters
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0);

    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.chat.sessions().session_count(),
        "session_store": state.chat.sessions().name(),
        "provider": state.chat.provider_name(),
        "model": &state.chat.options().model,
        "uptime_seconds": uptime,
    }))
}
