//! Background eviction of idle sessions.
//!
//! Spawned only when `[memory] session_ttl_seconds` is set. Sweeps the store
//! on a fixed interval derived from the TTL (half of it, clamped to
//! 1 s ..= 60 s) and stops on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::MemoryStore;
use crate::subsystems::runtime::{Component, ComponentFuture, ComponentKind};

pub struct MemoryJanitor {
    store: Arc<MemoryStore>,
    ttl: Duration,
}

impl MemoryJanitor {
    pub fn new(store: Arc<MemoryStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn sweep_interval(ttl: Duration) -> Duration {
        (ttl / 2).clamp(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Component for MemoryJanitor {
    fn id(&self) -> &str {
        "memory-janitor"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Housekeeping
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let period = Self::sweep_interval(self.ttl);
            info!(ttl_secs = self.ttl.as_secs(), every_secs = period.as_secs(), "memory janitor started");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing can be idle yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = self.store.evict_idle(self.ttl);
                        debug!(evicted, "janitor sweep");
                    }
                }
            }

            debug!("memory janitor stopped");
            Ok(())
        })
    }
}
