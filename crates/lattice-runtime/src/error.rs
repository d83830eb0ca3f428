//! Runtime error types.

use lattice_core::{DefinitionError, ResolveError};
use lattice_framework::{
    EventError, MiddlewareError, ModuleDefinitionError, PluginDefinitionError,
};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running an application.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Module(#[from] ModuleDefinitionError),

    #[error(transparent)]
    Plugin(#[from] PluginDefinitionError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A lifecycle handler failed while another error was being handled.
    #[error("lifecycle event '{event}' failed: {message}")]
    Lifecycle { event: String, message: String },
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
