//! Memory subsystem — per-session conversation history held in process memory.
//!
//! [`MemoryStore`] owns every [`Conversation`], keyed by an opaque session id.
//! Sessions are created on first reference and live until the process exits
//! or they are evicted ([`evict`](MemoryStore::evict),
//! [`evict_idle`](MemoryStore::evict_idle), [`clear`](MemoryStore::clear)).
//! Nothing is written to disk.
//!
//! ```text
//! MemoryStore
//! └── RwLock<HashMap<session_id, Arc<Conversation>>>
//!                                  └── Mutex<VecDeque<Turn>>
//! ```
//!
//! The map lock is held only for lookup/insert/remove; turn writes take the
//! conversation's own lock. Readers get cloned snapshots.

pub mod conversation;
pub mod janitor;
pub mod types;

pub use conversation::Conversation;
pub use types::{Role, Turn, render_transcript};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::MemorySettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Empty or whitespace-only session id. No state is created.
    #[error("invalid session id: {0:?}")]
    InvalidSession(String),
}

/// Configuration for the memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Per-session turn cap (FIFO eviction of oldest turns). `None` = unbounded.
    pub max_turns: Option<usize>,
    /// Idle time after which the janitor evicts a session. `None` = never.
    pub session_ttl: Option<Duration>,
}

impl From<&MemorySettings> for MemoryConfig {
    fn from(s: &MemorySettings) -> Self {
        Self { max_turns: s.max_turns, session_ttl: s.session_ttl }
    }
}

/// Process-wide conversation store. Constructed once at startup and shared
/// via `Arc`; tests build isolated instances.
pub struct MemoryStore {
    config: MemoryConfig,
    sessions: RwLock<HashMap<String, Arc<Conversation>>>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        info!(
            max_turns = ?config.max_turns,
            session_ttl_secs = ?config.session_ttl.map(|d| d.as_secs()),
            "memory store initialised"
        );
        Self { config, sessions: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Return the conversation for `session_id`, creating an empty one on
    /// first reference. Repeated calls return the same `Arc`.
    pub fn create_or_get(&self, session_id: &str) -> Result<Arc<Conversation>, MemoryError> {
        validate_session_id(session_id)?;

        if let Some(existing) = self.read().get(session_id) {
            existing.touch();
            return Ok(existing.clone());
        }

        // Another caller may have inserted between the two locks; `entry`
        // keeps whichever conversation got there first.
        let mut sessions = self.write();
        let conversation = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(%session_id, "session created");
                Arc::new(Conversation::new(session_id, self.config.max_turns))
            })
            .clone();
        drop(sessions);

        conversation.touch();
        Ok(conversation)
    }

    /// Look up an existing conversation without creating one.
    pub fn get(&self, session_id: &str) -> Option<Arc<Conversation>> {
        self.read().get(session_id).cloned()
    }

    /// Append a turn to `session_id`, creating the session if needed.
    pub fn append(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<(), MemoryError> {
        self.create_or_get(session_id)?.append(role, content);
        Ok(())
    }

    /// Full ordered history of `session_id`. A session that was never
    /// referenced renders as empty and is not created.
    pub fn render(&self, session_id: &str) -> Result<Vec<Turn>, MemoryError> {
        validate_session_id(session_id)?;
        Ok(self.get(session_id).map(|c| c.turns()).unwrap_or_default())
    }

    /// [`render`](Self::render) flattened to `"<role>: <content>"` lines.
    pub fn render_text(&self, session_id: &str) -> Result<String, MemoryError> {
        Ok(render_transcript(&self.render(session_id)?))
    }

    /// Drop one session. Returns `false` if it did not exist.
    ///
    /// Handles already given out keep working but are detached from the store.
    pub fn evict(&self, session_id: &str) -> bool {
        let removed = self.write().remove(session_id).is_some();
        if removed {
            debug!(%session_id, "session evicted");
        }
        removed
    }

    /// Drop every session idle for at least `ttl`. Returns how many went.
    ///
    /// A session whose `Arc` is held outside the map (a request waiting on the
    /// model) is never idle, whatever its last append time. New handles can
    /// only be taken through the map, so the count is stable under the write
    /// lock.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        let mut in_flight = 0usize;
        sessions.retain(|_, c| {
            if Arc::strong_count(c) > 1 {
                in_flight += 1;
                return true;
            }
            c.idle_for() < ttl
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, in_flight, remaining = sessions.len(), "idle sessions evicted");
        }
        evicted
    }

    /// Drop all sessions.
    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Known session ids, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Conversation>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Conversation>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

/// Reject empty and whitespace-only session ids.
pub fn validate_session_id(session_id: &str) -> Result<(), MemoryError> {
    if session_id.trim().is_empty() {
        return Err(MemoryError::InvalidSession(session_id.to_string()));
    }
    Ok(())
}
