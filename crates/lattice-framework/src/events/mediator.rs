//! Single-handler request/response events.

use std::collections::HashMap;

use lattice_core::Flow;
use tower::Service;
use tracing::trace;

use crate::error::{EventError, EventResult, MiddlewareResult};
use crate::invocation::Invocation;
use crate::middleware::BoxedMiddleware;

/// An event bus with exactly one handler per event, owned by a module or
/// plugin. Emitting awaits the handler and propagates its result; an
/// unknown event is an error.
pub struct Mediator {
    owner: String,
    handlers: HashMap<String, BoxedMiddleware>,
}

impl Mediator {
    /// Creates an empty mediator for the named owner.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            handlers: HashMap::new(),
        }
    }

    /// Binds `handler` to `event`. Binding the same event twice is an
    /// error.
    pub fn add(&mut self, event: impl Into<String>, handler: BoxedMiddleware) -> EventResult<()> {
        let event = event.into();
        if self.handlers.contains_key(&event) {
            return Err(EventError::DuplicateMediatorEvent {
                event,
                owner: self.owner.clone(),
            });
        }
        self.handlers.insert(event, handler);
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

    /// Emits `event`, awaiting the bound handler.
    pub async fn emit(&self, event: &str, invocation: Invocation) -> MiddlewareResult<Flow> {
        let Some(handler) = self.handlers.get(event) else {
            return Err(EventError::UnknownMediatorEvent {
                event: event.to_string(),
                owner: self.owner.clone(),
            }
            .into());
        };
        trace!(owner = %self.owner, event, "Mediator event emitted");
        handler.clone().call(invocation).await
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("owner", &self.owner)
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::middleware_sync;
    use crate::state::State;

    #[tokio::test]
    async fn emit_awaits_the_bound_handler() {
        let mut mediator = Mediator::new("orders");
        mediator
            .add(
                "recalculate",
                middleware_sync(|invocation| {
                    invocation.state().set("total", 42);
                    Ok(Flow::Continue)
                }),
            )
            .unwrap();

        let state = State::new();
        mediator
            .emit("recalculate", Invocation::new(state.clone()))
            .await
            .unwrap();
        assert_eq!(state.get("total"), Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn unknown_event_is_fatal() {
        let mediator = Mediator::new("orders");
        let err = mediator
            .emit("ghost", Invocation::new(State::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "mediator of 'orders' has no handler for event 'ghost'"
        );
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut mediator = Mediator::new("orders");
        mediator
            .add("recalculate", middleware_sync(|_| Ok(Flow::Continue)))
            .unwrap();
        let err = mediator
            .add("recalculate", middleware_sync(|_| Ok(Flow::Continue)))
            .unwrap_err();
        assert!(matches!(err, EventError::DuplicateMediatorEvent { .. }));
    }
}
