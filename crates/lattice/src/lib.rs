//! # Lattice
//!
//! A scoped dependency-injection and middleware application framework.
//!
//! ## Overview
//!
//! Lattice structures an application as **modules** — units that declare
//! injectable services and five ordered middleware blocks — optionally
//! grouped into **plugins** that share a compiler scope. A hierarchy of
//! DI compilers resolves declared dependencies lazily, with per-scope
//! memoization and explicit allow-lists for shared services.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐    ┌──────────────┐    ┌───────────────────────────────────┐
//! │   App   │───▶│ Plugin tree  │───▶│ plugin "billing"                  │
//! │         │    │ Module tree  │    │   ├── module "invoices" ──▶ blocks│
//! │ config  │    │ (insertion   │    │   └── module "receipts" ──▶ blocks│
//! │ events  │    │  ordered)    │    │ module "orders"         ──▶ blocks│
//! └─────────┘    └──────────────┘    └───────────────────────────────────┘
//!                                       each block: security → pre →
//!                                       validators → logic → post
//! ```
//!
//! - **Compilers**: scoped DI containers (module → plugin → root → shared)
//! - **Middleware**: tower services returning a [`Flow`](lattice_core::Flow)
//!   signal (`Continue` / `SkipBlock` / `Abort`)
//! - **Events**: mediator (awaited), emitter (fire-and-forget), exposed
//!   mediator (cross-plugin contracts)
//! - **App**: owns everything; no globals
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lattice::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let mut app = App::from_default_config()?;
//!     app.init_logging();
//!
//!     app.add_module(
//!         ModuleSpec::new("orders")
//!             .with_dependencies(vec![Definition::sync("repository", |_| {
//!                 Ok(InitOutput::instance(OrderRepository::new()))
//!             })])
//!             .with_module_logic([Middleware::new(|invocation| async move {
//!                 invocation.state().set("processed", true);
//!                 Ok(Flow::Continue)
//!             })
//!             .wants(["repository"])]),
//!     )?;
//!
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

pub use lattice_core as core;
pub use lattice_framework as framework;
pub use lattice_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lattice::prelude::*;
/// ```
pub mod prelude {
    // App - main entry point
    pub use lattice_runtime::{App, AppError, AppResult, ExecutionContext};

    // Configuration
    pub use lattice_runtime::config::{AppConfig, ConfigLoader};

    // Module and plugin declarations
    pub use lattice_framework::{
        middleware, middleware_sync, Block, BoxedMiddleware, Invocation, Middleware,
        ModuleSpec, PluginSpec, State,
    };

    // Events
    pub use lattice_framework::{Emitter, ExposedMediator, Mediator};

    // DI primitives
    pub use lattice_core::{
        CompilerPass, Definition, Flow, InitOutput, ResolvedArgs, SharedAccess, Visibility,
    };

    // Error types middleware code raises
    pub use lattice_framework::{MiddlewareError, MiddlewareResult};
}
