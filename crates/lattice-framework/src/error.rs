//! Error types for the framework layer.
//!
//! Add-time problems (bad specs, bad expressions, duplicate names) surface
//! as [`ModuleDefinitionError`] / [`PluginDefinitionError`] before any
//! construction side effect for the offending entity. Run-time problems
//! travel on the middleware error channel as [`MiddlewareError`].

use lattice_core::{DefinitionError, ResolveError};
use thiserror::Error;

/// Errors raised while validating or constructing a module.
#[derive(Debug, Error)]
pub enum ModuleDefinitionError {
    #[error("module name must not be empty")]
    EmptyName,

    #[error("module '{0}' is already registered")]
    Duplicate(String),

    #[error("module '{0}' is not registered")]
    NotFound(String),

    #[error("module '{module}' declares middleware '{middleware}' more than once in one block")]
    DuplicateMiddleware { module: String, middleware: String },

    #[error(
        "middleware '{middleware}' in module '{module}' declares reserved ambient name '{name}'"
    )]
    ReservedWant {
        module: String,
        middleware: String,
        name: String,
    },

    #[error("invalid middleware expression '{expression}' in module '{module}': {reason}")]
    Expression {
        module: String,
        expression: String,
        reason: String,
    },

    #[error(
        "definition '{definition}' in standalone module '{module}' declares plugin visibility"
    )]
    PluginScopeOutsidePlugin { module: String, definition: String },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Event(#[from] EventError),
}

/// Errors raised while validating or constructing a plugin.
#[derive(Debug, Error)]
pub enum PluginDefinitionError {
    #[error("plugin name must not be empty")]
    EmptyName,

    #[error("plugin '{0}' is already registered")]
    Duplicate(String),

    #[error("plugin '{0}' is not registered")]
    NotFound(String),

    #[error("in plugin '{plugin}': {source}")]
    Module {
        plugin: String,
        #[source]
        source: ModuleDefinitionError,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Event(#[from] EventError),
}

/// A middleware want that cannot be satisfied at run time.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("cannot resolve argument '{name}' for middleware '{middleware}'")]
    Unresolvable {
        name: String,
        middleware: String,
        #[source]
        source: ResolveError,
    },
}

/// Errors raised by the event primitives.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("mediator of '{owner}' has no handler for event '{event}'")]
    UnknownMediatorEvent { event: String, owner: String },

    #[error("mediator of '{owner}' already has a handler for event '{event}'")]
    DuplicateMediatorEvent { event: String, owner: String },

    #[error("exposed mediator event '{0}' is not declared")]
    UnknownExposedEvent(String),

    #[error("exposed mediator event '{0}' is already declared")]
    DuplicateExposedEvent(String),

    #[error("cannot pre-bind to exposed mediator event '{0}' after it was emitted")]
    BindAfterEmit(String),
}

/// The error channel of every middleware call.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Event(#[from] EventError),

    /// A domain failure raised by middleware code itself.
    #[error("{0}")]
    Failure(String),
}

impl MiddlewareError {
    /// Wraps a domain failure message.
    pub fn failure(message: impl Into<String>) -> Self {
        MiddlewareError::Failure(message.into())
    }
}

pub type ModuleResult<T> = Result<T, ModuleDefinitionError>;
pub type PluginResult<T> = Result<T, PluginDefinitionError>;
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;
pub type EventResult<T> = Result<T, EventError>;
