//! Service instances, resolved-argument bags, and injection adapters.
//!
//! A compiled service is an [`Arc`]ed value registered under a name. The
//! engine does not constrain the value's type: consumers downcast through
//! [`ResolvedArgs::get`] with the concrete type they expect.
//!
//! An init function receives the [`ResolvedArgs`] for its declared `wants`
//! and returns an [`InitOutput`]: either a finished instance, or one of
//! three **injection adapters** (constructor / property / method) that
//! trigger a second resolution pass before the instance materializes.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{BoxError, ResolveError, ResolveResult};

/// A type-erased, shareable service instance.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

// =============================================================================
// ResolvedArgs
// =============================================================================

/// The resolved values for a callable's declared dependency names.
///
/// Every service init and middleware function declares the names it needs
/// (`wants`); the compiler resolves each name and hands the callable one of
/// these bags. Values are `Arc`-shared — cloning the bag never clones a
/// service.
#[derive(Clone, Default)]
pub struct ResolvedArgs {
    values: HashMap<String, ServiceArc>,
}

impl ResolvedArgs {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a resolved value under `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: ServiceArc) {
        self.values.insert(name.into(), value);
    }

    /// Returns the raw type-erased value for `name`, if resolved.
    pub fn raw(&self, name: &str) -> Option<&ServiceArc> {
        self.values.get(name)
    }

    /// Returns the value for `name` downcast to `T`.
    ///
    /// Fails with [`ResolveError::NotFound`] when the name was never
    /// declared, or [`ResolveError::WrongType`] when the stored instance is
    /// not a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> ResolveResult<Arc<T>> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| ResolveError::WrongType {
                service: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Iterates the resolved names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of resolved values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for ResolvedArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedArgs")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// InitOutput — plain instances and injection adapters
// =============================================================================

/// A deferred build step used by the injection adapters.
///
/// Receives the resolved values for the adapter's own `wants` and produces
/// the final instance.
pub type BuildFn = Arc<dyn Fn(ResolvedArgs) -> Result<ServiceArc, BoxError> + Send + Sync>;

/// What a service init function returns.
///
/// A plain [`Instance`](InitOutput::Instance) is used as-is. The three
/// adapter variants request a **second resolution pass**: the compiler
/// resolves the adapter's `wants` and then invokes the adapter's closure to
/// produce the concrete instance.
#[derive(Clone)]
pub enum InitOutput {
    /// A finished service value.
    Instance(ServiceArc),

    /// Constructor injection: build a fresh instance from resolved services.
    Constructor {
        /// Names resolved before `build` runs.
        wants: Vec<String>,
        /// Builds the instance from the resolved values.
        build: BuildFn,
    },

    /// Property injection: fill named slots on a base value and return it.
    Property {
        /// Names resolved before `assign` runs.
        wants: Vec<String>,
        /// Assigns the resolved values onto the base value.
        assign: BuildFn,
    },

    /// Method injection: hand the resolved values to setter-style calls and
    /// return the finished value.
    Method {
        /// Names resolved before `bind` runs.
        wants: Vec<String>,
        /// Invokes the setters with the resolved values.
        bind: BuildFn,
    },
}

impl InitOutput {
    /// Wraps a plain value as a finished instance.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        InitOutput::Instance(Arc::new(value))
    }

    /// Wraps an already-shared value as a finished instance.
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        InitOutput::Instance(value)
    }

    /// Creates a constructor-injection adapter.
    pub fn constructor<I, S, F>(wants: I, build: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(ResolvedArgs) -> Result<ServiceArc, BoxError> + Send + Sync + 'static,
    {
        InitOutput::Constructor {
            wants: wants.into_iter().map(Into::into).collect(),
            build: Arc::new(build),
        }
    }

    /// Creates a property-injection adapter.
    pub fn property<I, S, F>(wants: I, assign: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(ResolvedArgs) -> Result<ServiceArc, BoxError> + Send + Sync + 'static,
    {
        InitOutput::Property {
            wants: wants.into_iter().map(Into::into).collect(),
            assign: Arc::new(assign),
        }
    }

    /// Creates a method-injection adapter.
    pub fn method<I, S, F>(wants: I, bind: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(ResolvedArgs) -> Result<ServiceArc, BoxError> + Send + Sync + 'static,
    {
        InitOutput::Method {
            wants: wants.into_iter().map(Into::into).collect(),
            bind: Arc::new(bind),
        }
    }
}

impl std::fmt::Debug for InitOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitOutput::Instance(_) => f.write_str("InitOutput::Instance"),
            InitOutput::Constructor { wants, .. } => f
                .debug_struct("InitOutput::Constructor")
                .field("wants", wants)
                .finish_non_exhaustive(),
            InitOutput::Property { wants, .. } => f
                .debug_struct("InitOutput::Property")
                .field("wants", wants)
                .finish_non_exhaustive(),
            InitOutput::Method { wants, .. } => f
                .debug_struct("InitOutput::Method")
                .field("wants", wants)
                .finish_non_exhaustive(),
        }
    }
}

// =============================================================================
// ServiceInit
// =============================================================================

/// The init function stored inside a [`Definition`](crate::Definition).
///
/// Both variants receive the resolved values for the definition's declared
/// `wants`. The async variant is awaited directly — there is no signal
/// polling of any kind.
#[derive(Clone)]
pub enum ServiceInit {
    /// A synchronous initializer.
    Sync(Arc<dyn Fn(ResolvedArgs) -> Result<InitOutput, BoxError> + Send + Sync>),
    /// An asynchronous initializer.
    Async(Arc<dyn Fn(ResolvedArgs) -> BoxFuture<'static, Result<InitOutput, BoxError>> + Send + Sync>),
}

impl ServiceInit {
    /// Returns `true` for the async variant.
    pub fn is_async(&self) -> bool {
        matches!(self, ServiceInit::Async(_))
    }
}

impl std::fmt::Debug for ServiceInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceInit::Sync(_) => f.write_str("ServiceInit::Sync"),
            ServiceInit::Async(_) => f.write_str("ServiceInit::Async"),
        }
    }
}

// =============================================================================
// Metadata and resolved services
// =============================================================================

/// Diagnostic metadata attached to every resolved service.
///
/// The read-only counterpart of a definition: which names it declared and
/// how it is exposed. Available through
/// [`Compiler::metadata_of`](crate::Compiler::metadata_of).
#[derive(Debug, Clone)]
pub struct ServiceMetadata {
    /// The definition name.
    pub name: String,
    /// The declared dependency names resolved before init ran.
    pub wants: Vec<String>,
    /// A human-readable description of the scope or sharing rules.
    pub exposure: String,
}

/// A resolved service: the instance plus its diagnostic metadata.
#[derive(Clone)]
pub struct ResolvedService {
    /// The type-erased instance.
    pub instance: ServiceArc,
    /// Metadata describing the definition that produced the instance.
    pub metadata: Arc<ServiceMetadata>,
}

impl std::fmt::Debug for ResolvedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedService")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
