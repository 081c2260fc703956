//! Comms subsystem — manages all external I/O channels.
//!
//! # Architecture
//!
//! Each channel (PTY, HTTP) implements [`Component`] and is spawned as an
//! independent concurrent task by [`start`] via [`spawn_components`].
//! Channels capture their shared [`Arc<CommsState>`] at construction time;
//! no state is passed through the generic `Component::run` signature. The
//! memory janitor rides on the same runtime when a session TTL is configured.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, session tracking). This is drained in a
//! short-lived background task that dies naturally when all channel senders
//! are dropped.
//!
//! # Starting
//!
//! [`start`] is synchronous: it returns a [`RuntimeHandle`] as soon as the
//! tasks are spawned. The caller decides when (or whether) to await it.

#[cfg(feature = "channel-axum")]
pub mod axum_channel;
#[cfg(feature = "channel-pty")]
pub mod pty;
mod state;

pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::subsystems::chat::ChatService;
use crate::subsystems::memory::janitor::MemoryJanitor;
use crate::subsystems::runtime::{Component, RuntimeHandle, spawn_components};

// ── start ───────────────────────────────────────────────────────────────────

/// Spawn all configured comms channels and return a [`RuntimeHandle`].
///
/// Channels start immediately. If any channel exits with an error the shared
/// `shutdown` token is cancelled so siblings stop cooperatively. The handle
/// resolves when all components have exited.
pub fn start(config: &Config, chat: Arc<ChatService>, shutdown: CancellationToken) -> RuntimeHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let memory = chat.memory().clone();
    let state = Arc::new(CommsState::new(chat, event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new(
                "pty0",
                config.comms.pty.session_id.clone(),
                state.clone(),
            )));
        }
    }

    #[cfg(feature = "channel-axum")]
    {
        if config.comms_http_should_load() {
            info!(bind = %config.comms.http.bind, "loading axum channel");
            components.push(Box::new(axum_channel::AxumChannel::new(
                "http0",
                config.comms.http.bind.clone(),
                config.comms.http.request_timeout,
                state.clone(),
            )));
        }
    }

    if components.is_empty() {
        info!("no comms channels configured, nothing to serve");
    } else if let Some(ttl) = memory.config().session_ttl {
        components.push(Box::new(MemoryJanitor::new(memory, ttl)));
    }

    // Dropping our clone leaves the channels as the only senders, so the
    // drain below ends once every channel has exited.
    drop(state);

    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::SessionStarted { ref channel_id, ref session_id } => {
                    info!(channel_id, session_id, "session started");
                }
            }
        }
    });

    spawn_components(components, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers;
    use crate::subsystems::chat::ChatPrompts;
    use crate::subsystems::memory::{MemoryConfig, MemoryStore};

    #[tokio::test]
    async fn no_channels_resolves_immediately() {
        let config = Config::test_default();
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let provider = providers::build(&config.llm, None).unwrap();
        let chat = Arc::new(ChatService::new(memory, provider, ChatPrompts::default()));

        let handle = start(&config, chat, CancellationToken::new());
        handle.join().await.unwrap();
    }

    #[cfg(feature = "channel-axum")]
    #[tokio::test]
    async fn http_channel_stops_on_shutdown() {
        let mut config = Config::test_default();
        config.comms.http.enabled = true;
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let provider = providers::build(&config.llm, None).unwrap();
        let chat = Arc::new(ChatService::new(memory, provider, ChatPrompts::default()));

        let shutdown = CancellationToken::new();
        let handle = start(&config, chat, shutdown.clone());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.join().await.unwrap();
    }

    #[cfg(feature = "channel-axum")]
    #[tokio::test]
    async fn bind_failure_is_reported() {
        let mut config = Config::test_default();
        config.comms.http.enabled = true;
        config.comms.http.bind = "not-an-address".into();
        let memory = Arc::new(MemoryStore::new(MemoryConfig::default()));
        let provider = providers::build(&config.llm, None).unwrap();
        let chat = Arc::new(ChatService::new(memory, provider, ChatPrompts::default()));

        let err = start(&config, chat, CancellationToken::new()).join().await.unwrap_err();
        assert!(err.to_string().contains("bind failed"));
    }
}
