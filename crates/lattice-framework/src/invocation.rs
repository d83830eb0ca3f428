//! The request value handed to every middleware and event handler.

use std::sync::Arc;

use lattice_core::{ResolvedArgs, ServiceArc};

use crate::error::MiddlewareError;
use crate::state::State;

/// One middleware invocation.
///
/// Carries the two ambient values every middleware can rely on — the shared
/// per-run [`State`] and the optional opaque `http` bundle supplied by the
/// execution factory — plus the entry's resolved `wants` and, for `on_error`
/// handlers only, the error being handled.
#[derive(Clone)]
pub struct Invocation {
    state: State,
    http: Option<ServiceArc>,
    args: ResolvedArgs,
    error: Option<Arc<MiddlewareError>>,
}

impl Invocation {
    /// Creates an invocation over a fresh argument bag.
    pub fn new(state: State) -> Self {
        Self {
            state,
            http: None,
            args: ResolvedArgs::new(),
            error: None,
        }
    }

    /// Attaches the opaque transport bundle.
    pub fn with_http(mut self, http: ServiceArc) -> Self {
        self.http = Some(http);
        self
    }

    /// Replaces the resolved argument bag.
    pub fn with_args(mut self, args: ResolvedArgs) -> Self {
        self.args = args;
        self
    }

    /// Attaches the error an `on_error` handler is invoked for.
    pub fn with_error(mut self, error: Arc<MiddlewareError>) -> Self {
        self.error = Some(error);
        self
    }

    /// The shared per-run state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The opaque transport bundle, when the run was started with one.
    pub fn http(&self) -> Option<&ServiceArc> {
        self.http.as_ref()
    }

    /// The entry's resolved `wants`.
    pub fn args(&self) -> &ResolvedArgs {
        &self.args
    }

    /// The error being handled, present only inside `on_error` handlers.
    pub fn error(&self) -> Option<&Arc<MiddlewareError>> {
        self.error.as_ref()
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("state", &self.state)
            .field("has_http", &self.http.is_some())
            .field("args", &self.args)
            .field("error", &self.error)
            .finish()
    }
}
