//! Unified error types for the Lattice core engine.
//!
//! Resolution failures ([`ResolveError`]) surface at compile time inside the
//! dependency tree; structural failures ([`DefinitionError`]) surface
//! synchronously at registration time, before any construction side effects.

use thiserror::Error;

/// A type-erased error returned by user-supplied service initializers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Resolution Errors
// =============================================================================

/// Errors raised while resolving a named dependency through the compiler chain.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No compiler in the chain holds a definition with this name.
    #[error("'{0}' definition not found in the dependency tree")]
    NotFound(String),

    /// The requested dependency name is empty.
    #[error("dependency name must be a non-empty string")]
    InvalidName,

    /// A user-supplied init function failed.
    #[error("service '{service}' failed to initialize: {message}")]
    Init {
        /// Name of the failing definition.
        service: String,
        /// Stringified cause.
        message: String,
    },

    /// A shared definition was requested by a caller outside its allow-list.
    #[error(
        "service '{service}' is not shared with module '{module}' (plugin '{}')",
        .plugin.as_deref().unwrap_or("none")
    )]
    Unauthorized {
        /// Name of the shared definition.
        service: String,
        /// The requesting module.
        module: String,
        /// The requesting plugin, when the module runs inside one.
        plugin: Option<String>,
    },

    /// A resolved instance could not be downcast to the requested type.
    #[error("service '{service}' resolved to the wrong type (expected {expected})")]
    WrongType {
        /// Name of the resolved service.
        service: String,
        /// The type the caller asked for.
        expected: &'static str,
    },

    /// A service referenced from a middleware expression did not resolve to
    /// a callable middleware value.
    #[error("service '{service}' is not callable as middleware")]
    NotCallable {
        /// Name of the resolved service.
        service: String,
    },
}

/// Result type for dependency resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

// =============================================================================
// Definition Errors
// =============================================================================

/// Structural validation failures for service definitions.
///
/// These are raised synchronously at registration time — a malformed
/// definition never reaches a compiler scope.
#[derive(Debug, Clone, Error)]
pub enum DefinitionError {
    /// The definition has an empty name.
    #[error("definition name must be a non-empty string")]
    EmptyName,

    /// `scope` and `shared` were both declared.
    #[error("definition '{0}' declares both a scope and a shared allow-list; they are mutually exclusive")]
    ScopeAndShared(String),

    /// Two definitions in the same dependency list carry the same name.
    #[error("duplicate definition name '{0}' in the same dependency list")]
    Duplicate(String),

    /// A compiler pass asked for a config property that the application
    /// config does not carry.
    #[error("definition '{definition}' requires config property '{property}' which is absent")]
    MissingConfigProperty {
        /// The definition declaring the pass.
        definition: String,
        /// The missing property path.
        property: String,
    },

    /// A compiler pass function reported a failure.
    #[error("compiler pass of definition '{definition}' failed: {message}")]
    PassFailed {
        /// The definition declaring the pass.
        definition: String,
        /// Stringified cause.
        message: String,
    },
}

/// Result type for definition validation and registration.
pub type DefinitionResult<T> = Result<T, DefinitionError>;
