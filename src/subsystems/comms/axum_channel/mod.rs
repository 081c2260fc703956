//! Axum-based HTTP channel — the chat API.
//!
//! Implements [`Component`] so it slots into the comms subsystem lifecycle:
//! `run()` drives the axum event loop and the shared [`CancellationToken`] is
//! wired to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! GET    /                 — liveness banner
//! GET    /health
//! POST   /chat             — JSON {text, session_id?}
//! POST   /chat-form        — form text=…&session_id=…, transcript prompt
//! GET    /sessions
//! POST   /sessions         — new session under a fresh id
//! GET    /sessions/{id}
//! DELETE /sessions/{id}
//! GET    /favicon.ico      → 204
//! ```

mod api;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::state::CommsState;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone: all fields are reference-counted or `Copy`.
#[derive(Clone)]
pub(crate) struct AxumState {
    /// Channel identifier used in log spans.
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
    /// Upper bound on one chat round-trip.
    pub request_timeout: Duration,
}

// ── AxumChannel ───────────────────────────────────────────────────────────────

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    request_timeout: Duration,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(
        channel_id: impl Into<String>,
        bind_addr: impl Into<String>,
        request_timeout: Duration,
        state: Arc<CommsState>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            request_timeout,
            state,
        }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        let state = AxumState {
            channel_id: Arc::from(self.channel_id.as_str()),
            comms: self.state,
            request_timeout: self.request_timeout,
        };
        Box::pin(run_axum(state, self.bind_addr, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_axum(state: AxumState, bind_addr: String, shutdown: CancellationToken) -> Result<(), AppError> {
    let channel_id = state.channel_id.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "axum channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "axum channel shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

pub(crate) fn build_router(state: AxumState) -> Router {
    Router::new()
        .route("/",                       get(api::root))
        .route("/health",                 get(api::health))
        .route("/chat",                   post(api::chat))
        .route("/chat-form",              post(api::chat_form))
        .route("/sessions",               get(api::sessions).post(api::create_session))
        .route("/sessions/{session_id}",  get(api::session_detail).delete(api::delete_session))
        .route("/favicon.ico",            get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
}
