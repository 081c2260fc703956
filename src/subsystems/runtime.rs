//! Component runtime: everything that runs until shutdown.
//!
//! A [`Component`] is a comms channel (PTY, HTTP) or a housekeeping task such
//! as the memory janitor. [`spawn_components`] runs each one on its own task
//! and supervises them from a single `JoinSet`, so every exit, error or
//! panic is attributed to the component id that caused it.
//!
//! The first failure cancels the shared [`CancellationToken`]; siblings stop
//! cooperatively and that failure is what [`RuntimeHandle::join`] reports.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// What a component does, which decides the error a panic turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Talks to users: PTY, HTTP.
    Channel,
    /// Background upkeep of shared state.
    Housekeeping,
}

impl ComponentKind {
    fn panic_error(self, id: &str, e: &JoinError) -> AppError {
        let msg = format!("component '{id}' panicked: {e}");
        match self {
            ComponentKind::Channel => AppError::Comms(msg),
            ComponentKind::Housekeeping => AppError::Memory(msg),
        }
    }
}

pub trait Component: Send + 'static {
    /// Stable identifier used in log messages and errors.
    fn id(&self) -> &str;

    fn kind(&self) -> ComponentKind {
        ComponentKind::Channel
    }

    /// Consume the component and return its run-loop. The future should
    /// finish once `shutdown` is cancelled or its own work is done.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Handle to a running component set.
pub struct RuntimeHandle {
    ids: Vec<String>,
    inner: JoinHandle<Result<(), AppError>>,
}

impl RuntimeHandle {
    /// Ids of the components this handle supervises, in spawn order.
    pub fn component_ids(&self) -> &[String] {
        &self.ids
    }

    /// Await every component and return the first failure, if any.
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .unwrap_or_else(|e| Err(AppError::Runtime(format!("supervisor task failed: {e}"))))
    }
}

struct Exit {
    id: String,
    kind: ComponentKind,
    outcome: Result<Result<(), AppError>, JoinError>,
}

/// Start every component and return a handle to the set.
///
/// An empty list yields a handle that resolves immediately.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> RuntimeHandle {
    let ids: Vec<String> = components.iter().map(|c| c.id().to_string()).collect();

    let inner = tokio::spawn(async move {
        let mut set: JoinSet<Exit> = JoinSet::new();
        for component in components {
            let id = component.id().to_string();
            let kind = component.kind();
            debug!(component = %id, ?kind, "spawning component");
            // The inner task isolates a panic so it is still reported under `id`.
            let run = tokio::spawn(component.run(shutdown.clone()));
            set.spawn(async move { Exit { id, kind, outcome: run.await } });
        }

        let mut first_err: Option<AppError> = None;
        while let Some(joined) = set.join_next().await {
            let Exit { id, kind, outcome } = match joined {
                Ok(exit) => exit,
                Err(e) => {
                    error!("component supervisor failed: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Runtime(e.to_string()));
                    continue;
                }
            };

            let failure = match outcome {
                Ok(Ok(())) => {
                    info!(component = %id, remaining = set.len(), "component exited");
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => kind.panic_error(&id, &e),
            };
            error!(component = %id, remaining = set.len(), "component failed: {failure}");
            shutdown.cancel();
            first_err.get_or_insert(failure);
        }

        first_err.map_or(Ok(()), Err)
    });

    RuntimeHandle { ids, inner }
}
