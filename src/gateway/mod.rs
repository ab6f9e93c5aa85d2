//! Axum-based HTTP gateway.
//!
//! Routes:
//! - `POST /api/chat`: one chat turn, session chosen by `X-Session-ID`
//! - `GET /health`: liveness and session counters

pub mod api;

use crate::agent::ChatService;
use crate::config::{Config, GatewayConfig};
use crate::providers;
use crate::sessions;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub default_session_id: Arc<str>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(chat: ChatService, default_session_id: &str) -> Self {
        Self {
            chat: Arc::new(chat),
            default_session_id: Arc::from(default_session_id),
            started_at: Utc::now(),
        }
    }
}

/// Build the gateway router with its middleware stack.
#[allow(deprecated)]
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            gateway.request_timeout_secs,
        )));

    let app = Router::new()
        .route("/api/chat", post(api::handle_chat))
        .route("/health", get(api::handle_health))
        .with_state(state)
        .layer(middleware);

    if gateway.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Wire provider, session store, and chat service from `config`.
pub fn build_state(config: &Config) -> Result<AppState> {
    let provider = providers::create_provider(
        &config.provider,
        config.api_key.as_deref(),
        config.api_url.as_deref(),
        config.provider_timeout(),
    )?;
    let store = sessions::create_session_store(config.session.history_capacity);
    let chat = ChatService::new(store, Arc::from(provider), config.completion_options())
        .with_fallback_reply(config.fallback_reply.clone());

    Ok(AppState::new(chat, &config.session.default_session_id))
}

/// Bind `host:port` and serve until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let state = build_state(&config)?;
    let app = build_router(state, &config.gateway);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind gateway to {host}:{port}"))?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        provider = %config.provider,
        model = %config.model,
        history_capacity = config.session.history_capacity,
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Gateway shutting down");
        })
        .await
        .context("Gateway server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::chat::test_support::ScriptedProvider;
    use crate::agent::DEFAULT_FALLBACK_REPLY;
    use crate::providers::CompletionOptions;
    use crate::sessions::{InMemorySessionStore, SessionStore, Turn};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<dyn SessionStore>,
        provider: Arc<ScriptedProvider>,
    }

    fn test_app(provider: ScriptedProvider) -> TestApp {
        test_app_with(provider, &GatewayConfig::default())
    }

    fn test_app_with(provider: ScriptedProvider, gateway: &GatewayConfig) -> TestApp {
        let provider = Arc::new(provider);
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let chat = ChatService::new(
            Arc::clone(&store),
            Arc::clone(&provider) as Arc<dyn providers::Provider>,
            CompletionOptions::default(),
        );
        let router = build_router(AppState::new(chat, "default"), gateway);
        TestApp {
            router,
            store,
            provider,
        }
    }

    async fn post_chat(app: &TestApp, session: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(id) = session {
            request = request.header("X-Session-ID", id);
        }
        let request = request.body(Body::from(body.to_string())).unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn chat_returns_reply_and_records_turns() {
        let app = test_app(ScriptedProvider::replying(&["hello there"]));

        let (status, body) = post_chat(&app, Some("s1"), r#"{"message":"hi"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"response": "hello there"}));
        assert_eq!(
            app.store.snapshot("s1").await.unwrap(),
            vec![Turn::user("hi"), Turn::assistant("hello there")]
        );
    }

    #[tokio::test]
    async fn missing_session_header_uses_default() {
        let app = test_app(ScriptedProvider::replying(&["r1", "r2"]));

        post_chat(&app, None, r#"{"message":"one"}"#).await;
        post_chat(&app, None, r#"{"message":"two"}"#).await;

        let turns = app.store.snapshot("default").await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(app.store.session_count(), 1);
    }

    #[tokio::test]
    async fn blank_session_header_is_its_own_session() {
        let app = test_app(ScriptedProvider::replying(&["r1", "r2"]));

        post_chat(&app, None, r#"{"message":"one"}"#).await;
        post_chat(&app, Some(" "), r#"{"message":"two"}"#).await;

        assert_eq!(app.store.session_count(), 2);
        assert_eq!(
            app.store.snapshot(" ").await.unwrap(),
            vec![Turn::user("two"), Turn::assistant("r2")]
        );
        assert_eq!(app.store.snapshot("default").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_or_missing_message_is_rejected_without_mutation() {
        let app = test_app(ScriptedProvider::replying(&[]));

        for body in [
            r#"{"message":""}"#,
            r#"{}"#,
            r#"{"message":null}"#,
            "not json",
            "",
            r#"["hi"]"#,
            r#""hi""#,
        ] {
            let (status, json) = post_chat(&app, Some("s1"), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body:?}");
            assert_eq!(json, json!({"error": "No message provided"}));
        }

        assert_eq!(app.store.session_count(), 0);
        assert!(app.provider.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn sequential_requests_keep_conversational_order() {
        let app = test_app(ScriptedProvider::replying(&["r1", "r2"]));

        post_chat(&app, Some("s"), r#"{"message":"hi"}"#).await;
        post_chat(&app, Some("s"), r#"{"message":"how are you"}"#).await;

        assert_eq!(
            app.store.snapshot("s").await.unwrap(),
            vec![
                Turn::user("hi"),
                Turn::assistant("r1"),
                Turn::user("how are you"),
                Turn::assistant("r2"),
            ]
        );
    }

    #[tokio::test]
    async fn sessions_are_isolated_across_requests() {
        let app = test_app(ScriptedProvider::replying(&["ra"]));
        let b = app.store.get_or_create("b");

        post_chat(&app, Some("a"), r#"{"message":"only a"}"#).await;

        assert!(b.lock().await.is_empty());
        assert_eq!(app.store.snapshot("a").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_choices_returns_fallback_text() {
        let app = test_app(ScriptedProvider::new(vec![Ok(None)]));

        let (status, body) = post_chat(&app, Some("s"), r#"{"message":"anyone?"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], DEFAULT_FALLBACK_REPLY);
        assert_eq!(
            app.store.snapshot("s").await.unwrap()[1],
            Turn::assistant(DEFAULT_FALLBACK_REPLY)
        );
    }

    #[tokio::test]
    async fn upstream_failure_is_500_with_sanitized_error() {
        let app = test_app(ScriptedProvider::new(vec![Err(anyhow::anyhow!(
            "nvidia API error (401 Unauthorized): bad key nvapi-leaked123"
        ))]));

        let (status, body) = post_chat(&app, Some("s"), r#"{"message":"hi"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("401"));
        assert!(!error.contains("nvapi-leaked123"));
        assert_eq!(app.provider.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let gateway = GatewayConfig {
            max_body_bytes: 32,
            ..GatewayConfig::default()
        };
        let app = test_app_with(ScriptedProvider::replying(&[]), &gateway);

        let big = format!(r#"{{"message":"{}"}}"#, "x".repeat(100));
        let (status, _) = post_chat(&app, Some("s"), &big).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(app.store.session_count(), 0);
    }

    #[tokio::test]
    async fn slow_completion_hits_request_timeout() {
        let gateway = GatewayConfig {
            request_timeout_secs: 1,
            ..GatewayConfig::default()
        };
        let provider =
            ScriptedProvider::replying(&["late"]).with_delay(Duration::from_secs(3));
        let app = test_app_with(provider, &gateway);

        let (status, _) = post_chat(&app, Some("s"), r#"{"message":"hi"}"#).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        // the user turn was recorded before the request was cut off
        assert_eq!(app.store.snapshot("s").await.unwrap(), vec![Turn::user("hi")]);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let app = test_app(ScriptedProvider::replying(&[]));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/chat")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-session-id")
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let app = test_app(ScriptedProvider::replying(&["r"]));
        post_chat(&app, Some("s"), r#"{"message":"hi"}"#).await;

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
        assert_eq!(body["session_store"], "in_memory");
        assert_eq!(body["model"], "qwen/qwen3-next-80b-a3b-instruct");
    }

    #[test]
    fn build_state_uses_configured_provider() {
        let mut config = Config::default();
        config.api_key = Some("test-key".into());
        config.session.default_session_id = "web".into();

        let state = build_state(&config).unwrap();
        assert_eq!(state.chat.provider_name(), "nvidia");
        assert_eq!(&*state.default_session_id, "web");
        assert_eq!(state.chat.sessions().capacity(), 10);
    }

    #[test]
    fn build_state_rejects_unknown_provider() {
        let mut config = Config::default();
        config.provider = "nonexistent".into();
        assert!(build_state(&config).is_err());
    }
}
