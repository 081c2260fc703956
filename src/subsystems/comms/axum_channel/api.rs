//! Axum handlers for the chat API.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`] and
//! returns an axum [`Response`]. Error bodies share one shape:
//! `{"error": <code>, "message": <text>}`.

use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AxumState;
use crate::subsystems::chat::{ChatError, PromptStyle};

/// Session used when a request names none.
pub(super) const DEFAULT_SESSION_ID: &str = "default";

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct ChatRequest {
    #[serde(default)]
    text: String,
    session_id: Option<String>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn json_error(status: StatusCode, code: &str, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": code, "message": format!("{msg}") }))).into_response()
}

async fn handle_chat(state: AxumState, req: ChatRequest, style: PromptStyle) -> Response {
    // Blank check only; the text is stored as sent.
    if req.text.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "bad_request", "text must not be empty");
    }
    let session_id = req
        .session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID);

    debug!(channel_id = %state.channel_id, %session_id, ?style, "chat request");

    match tokio::time::timeout(
        state.request_timeout,
        state.comms.send_message(&state.channel_id, session_id, &req.text, style),
    )
    .await
    {
        Ok(Ok(reply)) => (StatusCode::OK, Json(json!({ "reply": reply, "session_id": session_id }))).into_response(),
        Ok(Err(ChatError::Memory(e))) => json_error(StatusCode::BAD_REQUEST, "bad_request", e),
        Ok(Err(ChatError::Provider(e))) => {
            warn!(channel_id = %state.channel_id, %session_id, "chat failed: {e}");
            json_error(StatusCode::BAD_GATEWAY, "provider", e)
        }
        #[cfg(feature = "subsystem-rag")]
        Ok(Err(ChatError::Retrieval(e))) => {
            warn!(channel_id = %state.channel_id, %session_id, "retrieval failed: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "retrieval", e)
        }
        Err(_) => {
            warn!(channel_id = %state.channel_id, %session_id, "chat timed out");
            json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", "LLM request timed out")
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /
pub(super) async fn root() -> Response {
    Json(json!({ "message": "Chatbot API running. Use POST /chat" })).into_response()
}

/// GET /health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    Json(json!({ "status": "ok", "sessions": state.comms.session_count() })).into_response()
}

/// POST /chat — structured history.
pub(super) async fn chat(State(state): State<AxumState>, Json(req): Json<ChatRequest>) -> Response {
    handle_chat(state, req, PromptStyle::Messages).await
}

/// POST /chat-form — the history is sent to the model as one transcript.
pub(super) async fn chat_form(State(state): State<AxumState>, Form(req): Form<ChatRequest>) -> Response {
    handle_chat(state, req, PromptStyle::Transcript).await
}

/// GET /sessions
pub(super) async fn sessions(State(state): State<AxumState>) -> Response {
    Json(json!({ "sessions": state.comms.sessions() })).into_response()
}

/// POST /sessions — open an empty session under a fresh UUIDv7.
pub(super) async fn create_session(State(state): State<AxumState>) -> Response {
    let session_id = Uuid::now_v7().to_string();
    match state.comms.open_session(&state.channel_id, &session_id) {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "session_id": session_id }))).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e),
    }
}

/// GET /sessions/{session_id}
pub(super) async fn session_detail(State(state): State<AxumState>, Path(session_id): Path<String>) -> Response {
    match state.comms.session_history(&session_id) {
        Some(turns) => Json(json!({ "session_id": session_id, "turns": turns })).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", format!("unknown session: {session_id}")),
    }
}

/// DELETE /sessions/{session_id}
pub(super) async fn delete_session(State(state): State<AxumState>, Path(session_id): Path<String>) -> Response {
    if state.comms.end_session(&session_id) {
        debug!(channel_id = %state.channel_id, %session_id, "session deleted");
        StatusCode::NO_CONTENT.into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "not_found", format!("unknown session: {session_id}"))
    }
}
