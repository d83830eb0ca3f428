//! # Lattice Core
//!
//! The scoped dependency-injection engine for the Lattice application
//! framework.
//!
//! This layer knows nothing about modules, plugins, or middleware. It
//! provides:
//!
//! - [`Definition`] — the declarative description of one injectable service,
//!   with an explicit declared-dependency list (`wants`) instead of any kind
//!   of signature reflection.
//! - [`Compiler`] — a scoped DI container with lazy resolution and
//!   per-scope memoization, linked into a hierarchy
//!   (module → plugin → root → shared).
//! - Shared-scope permission checks: a definition published with a
//!   [`SharedAccess`] allow-list is only resolvable by the named modules and
//!   plugins, cached or not.
//! - [`CompilerPass`] — a one-time registration hook that lets a definition
//!   declaratively register sibling definitions into its own scope through a
//!   restricted [`PassContext`] that structurally cannot compile.
//! - [`Flow`] — the tagged completion signal returned by every middleware
//!   call in the framework layer (`Continue` / `SkipBlock` / `Abort`).
//!
//! Higher-level layers are built on top: `lattice-framework` adds modules,
//! plugins, and the middleware execution engine; `lattice-runtime` adds the
//! application shell, configuration, and logging.

pub mod compiler;
pub mod definition;
pub mod error;
pub mod flow;
pub mod service;

pub use compiler::{Caller, Compiler};
pub use definition::{
    validate_list, CompilerPass, Definition, PassContext, SharedAccess, Visibility,
};
pub use error::{BoxError, DefinitionError, DefinitionResult, ResolveError, ResolveResult};
pub use flow::Flow;
pub use service::{
    InitOutput, ResolvedArgs, ResolvedService, ServiceArc, ServiceInit, ServiceMetadata,
};
