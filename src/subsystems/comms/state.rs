//! Shared state for the Comms subsystem — capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The [`ChatService`] is private; channels cannot reach the
//! provider or the retriever directly.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager (e.g. "I shut down", "new session started"). The manager
//! owns the receiver end.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::subsystems::chat::{ChatError, ChatService, PromptStyle};
use crate::subsystems::memory::{MemoryError, Turn, validate_session_id};

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A session was referenced for the first time through this channel.
    SessionStarted { channel_id: String, session_id: String },
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    chat: Arc<ChatService>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(chat: Arc<ChatService>, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { chat, event_tx }
    }

    /// Send `content` from `channel_id` into `session_id` and await the reply.
    ///
    /// This is the primary path for all comms channels. A rejected session id
    /// fails here, before any event is reported.
    pub async fn send_message(
        &self,
        channel_id: &str,
        session_id: &str,
        content: &str,
        style: PromptStyle,
    ) -> Result<String, ChatError> {
        validate_session_id(session_id)?;
        if self.chat.memory().get(session_id).is_none() {
            self.report_event(CommsEvent::SessionStarted {
                channel_id: channel_id.to_string(),
                session_id: session_id.to_string(),
            });
        }
        self.chat.respond(session_id, content, style).await
    }

    /// Create an empty session; idempotent for an existing id.
    pub fn open_session(&self, channel_id: &str, session_id: &str) -> Result<(), MemoryError> {
        self.chat.memory().create_or_get(session_id)?;
        self.report_event(CommsEvent::SessionStarted {
            channel_id: channel_id.to_string(),
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    /// Sorted ids of every live session.
    pub fn sessions(&self) -> Vec<String> {
        self.chat.memory().session_ids()
    }

    pub fn session_count(&self) -> usize {
        self.chat.memory().len()
    }

    /// History of an existing session; `None` if it was never created.
    pub fn session_history(&self, session_id: &str) -> Option<Vec<Turn>> {
        self.chat.memory().get(session_id).map(|c| c.turns())
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.chat.memory().evict(session_id)
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
