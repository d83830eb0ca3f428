//! Fire-and-forget events.

use std::collections::HashMap;

use tower::Service;
use tracing::{debug, error, trace};

use crate::error::EventResult;
use crate::invocation::Invocation;
use crate::middleware::BoxedMiddleware;

/// An event bus whose handlers run on spawned tasks.
///
/// `emit` returns as soon as the handler is scheduled; completion is
/// deliberately not synchronized with the caller. Handler errors are
/// logged, never propagated. An unknown event is a no-op.
pub struct Emitter {
    owner: String,
    handlers: HashMap<String, BoxedMiddleware>,
}

impl Emitter {
    /// Creates an empty emitter for the named owner.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            handlers: HashMap::new(),
        }
    }

    /// Binds `handler` to `event`, replacing any previous handler.
    pub fn add(&mut self, event: impl Into<String>, handler: BoxedMiddleware) -> EventResult<()> {
        self.handlers.insert(event.into(), handler);
        Ok(())
    }

    /// Returns `true` when a handler is bound to `event`.
    pub fn has(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Returns `true` when no handlers are bound.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Schedules the handler for `event` and returns immediately.
    pub fn emit(&self, event: &str, invocation: Invocation) {
        let Some(handler) = self.handlers.get(event) else {
            debug!(owner = %self.owner, event, "Emitter event has no handler");
            return;
        };
        trace!(owner = %self.owner, event, "Emitter event scheduled");

        let mut handler = handler.clone();
        let owner = self.owner.clone();
        let event = event.to_string();
        tokio::spawn(async move {
            if let Err(e) = handler.call(invocation).await {
                error!(owner = %owner, event = %event, error = %e, "Emitter handler failed");
            }
        });
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("owner", &self.owner)
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::middleware;
    use crate::state::State;
    use lattice_core::Flow;

    #[tokio::test]
    async fn emit_does_not_block_the_caller() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = std::sync::Arc::new(parking_lot::Mutex::new(Some(tx)));

        let mut emitter = Emitter::new("audit");
        emitter
            .add(
                "entry_written",
                middleware(move |_| {
                    let tx = std::sync::Arc::clone(&tx);
                    async move {
                        if let Some(tx) = tx.lock().take() {
                            let _ = tx.send(());
                        }
                        Ok(Flow::Continue)
                    }
                }),
            )
            .unwrap();

        // Returns immediately; the handler completes on its own task.
        emitter.emit("entry_written", Invocation::new(State::new()));
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_event_is_a_no_op() {
        let emitter = Emitter::new("audit");
        emitter.emit("ghost", Invocation::new(State::new()));
    }
}
