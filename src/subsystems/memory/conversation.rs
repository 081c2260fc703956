//! [`Conversation`] — the ordered turn log of a single session.
//!
//! A conversation is shared as `Arc<Conversation>`; every handle returned for
//! the same session id points at the same log. Turns sit behind a per-session
//! `Mutex` so appends to one session are serialised while other sessions
//! proceed independently. Lock scopes are a push or a clone, never an
//! `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use super::types::{Role, Turn, render_transcript};

struct Log {
    turns: VecDeque<Turn>,
    last_active: Instant,
}

pub struct Conversation {
    session_id: String,
    /// FIFO cap; `None` = unbounded.
    max_turns: Option<usize>,
    log: Mutex<Log>,
}

impl Conversation {
    pub(crate) fn new(session_id: impl Into<String>, max_turns: Option<usize>) -> Self {
        Self {
            session_id: session_id.into(),
            max_turns,
            log: Mutex::new(Log {
                turns: VecDeque::new(),
                last_active: Instant::now(),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one turn. Empty `content` is recorded as-is.
    pub fn append(&self, role: Role, content: impl Into<String>) {
        let mut log = self.lock();
        self.push(&mut log, Turn::new(role, content));
    }

    /// Append one turn and return the history as it stands right after it,
    /// under the same lock. The returned snapshot always ends with the turn
    /// just appended, even when other requests write to this session.
    pub fn append_and_snapshot(&self, role: Role, content: impl Into<String>) -> Vec<Turn> {
        let mut log = self.lock();
        self.push(&mut log, Turn::new(role, content));
        log.turns.iter().cloned().collect()
    }

    /// Snapshot of every turn in append order.
    pub fn turns(&self) -> Vec<Turn> {
        self.lock().turns.iter().cloned().collect()
    }

    /// Flattened `"<role>: <content>"` rendering of [`turns`](Self::turns).
    pub fn render_text(&self) -> String {
        render_transcript(&self.turns())
    }

    pub fn len(&self) -> usize {
        self.lock().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time since the last append or lookup through the store.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_active.elapsed()
    }

    pub(crate) fn touch(&self) {
        self.lock().last_active = Instant::now();
    }

    fn push(&self, log: &mut Log, turn: Turn) {
        log.turns.push_back(turn);
        log.last_active = Instant::now();
        if let Some(cap) = self.max_turns {
            while log.turns.len() > cap {
                log.turns.pop_front();
                trace!(session_id = %self.session_id, cap, "oldest turn dropped");
            }
        }
    }

    /// A panic elsewhere cannot leave a half-pushed turn behind, so a
    /// poisoned lock still guards a consistent log.
    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("session_id", &self.session_id)
            .field("max_turns", &self.max_turns)
            .field("turns", &self.len())
            .finish()
    }
}
