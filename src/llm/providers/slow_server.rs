//! Local OpenAI-compatible endpoint that answers after a fixed delay, for
//! exercising timeouts and work that races an in-flight model call.

use std::time::Duration;

use axum::{Json, Router, routing::post};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::config::{Config, LlmConfig};

/// Serve `POST /v1/chat/completions` on an ephemeral port. Every request
/// sleeps for `delay`, then answers `reply`. Returns an `openai` provider
/// config pointing at it.
pub(crate) async fn slow_completions(delay: Duration, reply: &'static str) -> LlmConfig {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(_request): Json<Value>| async move {
            tokio::time::sleep(delay).await;
            Json(json!({ "choices": [{ "message": { "role": "assistant", "content": reply } }] }))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut llm = Config::test_default().llm;
    llm.provider = "openai".into();
    llm.openai.api_base_url = format!("http://{addr}/v1/chat/completions");
    llm.openai.timeout_seconds = 10;
    llm
}
