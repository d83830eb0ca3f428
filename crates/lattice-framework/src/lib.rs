//! # Lattice Framework
//!
//! Modules, plugins, middleware and events on top of the `lattice-core`
//! DI engine.
//!
//! This layer provides:
//! - The tower-based middleware unit and the five-block execution engine
//! - Module and plugin declarations with scoped service registration
//! - Insertion-ordered trees with override and removal semantics
//! - Mediator, emitter and exposed-mediator event primitives
//!
//! The application shell that wires these together lives in
//! `lattice-runtime`.

mod engine;

pub mod error;
pub mod events;
pub mod expression;
pub mod invocation;
pub mod middleware;
pub mod module;
pub mod plugin;
pub mod state;
pub mod tree;

pub use error::{
    ArgumentError, EventError, EventResult, MiddlewareError, MiddlewareResult,
    ModuleDefinitionError, ModuleResult, PluginDefinitionError, PluginResult,
};
pub use events::{Emitter, ExposedMediator, Mediator, ON_ERROR_EVENT};
pub use invocation::Invocation;
pub use middleware::{middleware, middleware_sync, Block, BoxedMiddleware, Middleware,
    MiddlewareService};
pub use module::{Module, ModuleSpec, Runnable, ScopeLinks};
pub use plugin::{Plugin, PluginSpec};
pub use state::State;
pub use tree::{ModuleTree, PluginTree, RunOutcome};
