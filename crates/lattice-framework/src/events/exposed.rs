//! Cross-plugin event contracts.

use std::collections::HashMap;

use parking_lot::Mutex;
use tower::Service;
use tracing::trace;

use crate::error::{EventError, EventResult, MiddlewareResult};
use crate::invocation::Invocation;
use crate::middleware::BoxedMiddleware;

struct ExposedEvent {
    handlers: Vec<BoxedMiddleware>,
    emitted: bool,
}

/// An event surface one plugin exposes to the rest of the application.
///
/// The owning plugin declares event names with [`add`](Self::add); other
/// parties attach handlers with [`pre_bind`](Self::pre_bind) — strictly
/// before the first emit. Each emit awaits every bound handler in bind
/// order and sets a permanent emitted flag; a `pre_bind` after that flag is
/// set is an internal-consistency error.
#[derive(Default)]
pub struct ExposedMediator {
    events: Mutex<HashMap<String, ExposedEvent>>,
}

impl ExposedMediator {
    /// Creates an empty exposed mediator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an event name. Declaring the same name twice is an error.
    pub fn add(&self, event: impl Into<String>) -> EventResult<()> {
        let event = event.into();
        let mut events = self.events.lock();
        if events.contains_key(&event) {
            return Err(EventError::DuplicateExposedEvent(event));
        }
        events.insert(
            event,
            ExposedEvent {
                handlers: Vec::new(),
                emitted: false,
            },
        );
        Ok(())
    }

    /// Returns `true` when `event` is declared.
    pub fn has(&self, event: &str) -> bool {
        self.events.lock().contains_key(event)
    }

    /// Undeclares an event, dropping its handlers and emitted flag. Used
    /// when the owning plugin is removed; re-adding the plugin re-declares
    /// a fresh event.
    pub fn remove(&self, event: &str) -> bool {
        self.events.lock().remove(event).is_some()
    }

    /// Attaches a handler to a declared event, before its first emit.
    pub fn pre_bind(&self, event: &str, handler: BoxedMiddleware) -> EventResult<()> {
        let mut events = self.events.lock();
        let entry = events
            .get_mut(event)
            .ok_or_else(|| EventError::UnknownExposedEvent(event.to_string()))?;
        if entry.emitted {
            return Err(EventError::BindAfterEmit(event.to_string()));
        }
        entry.handlers.push(handler);
        Ok(())
    }

    /// Emits `event`, awaiting every pre-bound handler in bind order.
    ///
    /// The first emit permanently closes the event for further binding.
    /// Repeated emits are allowed.
    pub async fn emit(&self, event: &str, invocation: Invocation) -> MiddlewareResult<()> {
        // Snapshot under the lock; the guard must not cross an await.
        let handlers = {
            let mut events = self.events.lock();
            let entry = events
                .get_mut(event)
                .ok_or_else(|| EventError::UnknownExposedEvent(event.to_string()))?;
            entry.emitted = true;
            entry.handlers.clone()
        };

        trace!(event, handlers = handlers.len(), "Exposed event emitted");
        for mut handler in handlers {
            handler.call(invocation.clone()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExposedMediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.events.lock();
        f.debug_struct("ExposedMediator")
            .field("events", &events.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::middleware_sync;
    use crate::state::State;
    use lattice_core::Flow;
    use serde_json::json;

    fn recorder(key: &'static str) -> BoxedMiddleware {
        middleware_sync(move |invocation| {
            invocation.state().with(|map| {
                let order = map.entry("order").or_insert_with(|| json!([]));
                if let Some(items) = order.as_array_mut() {
                    items.push(json!(key));
                }
            });
            Ok(Flow::Continue)
        })
    }

    #[tokio::test]
    async fn handlers_run_in_bind_order() {
        let mediator = ExposedMediator::new();
        mediator.add("user_created").unwrap();
        mediator.pre_bind("user_created", recorder("first")).unwrap();
        mediator.pre_bind("user_created", recorder("second")).unwrap();

        let state = State::new();
        mediator
            .emit("user_created", Invocation::new(state.clone()))
            .await
            .unwrap();
        assert_eq!(state.get("order"), Some(json!(["first", "second"])));
    }

    #[tokio::test]
    async fn pre_bind_after_emit_is_rejected() {
        let mediator = ExposedMediator::new();
        mediator.add("user_created").unwrap();
        mediator
            .emit("user_created", Invocation::new(State::new()))
            .await
            .unwrap();

        let err = mediator
            .pre_bind("user_created", recorder("late"))
            .unwrap_err();
        assert!(matches!(err, EventError::BindAfterEmit(_)));
    }

    #[tokio::test]
    async fn repeated_emits_are_allowed() {
        let mediator = ExposedMediator::new();
        mediator.add("tick").unwrap();
        mediator.pre_bind("tick", recorder("t")).unwrap();

        let state = State::new();
        mediator.emit("tick", Invocation::new(state.clone())).await.unwrap();
        mediator.emit("tick", Invocation::new(state.clone())).await.unwrap();
        assert_eq!(state.get("order"), Some(json!(["t", "t"])));
    }

    #[tokio::test]
    async fn undeclared_event_is_rejected() {
        let mediator = ExposedMediator::new();
        let err = mediator
            .emit("ghost", Invocation::new(State::new()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "exposed mediator event 'ghost' is not declared");

        let err = mediator.pre_bind("ghost", recorder("x")).unwrap_err();
        assert!(matches!(err, EventError::UnknownExposedEvent(_)));
    }
}
