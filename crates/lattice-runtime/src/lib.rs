//! # Lattice Runtime
//!
//! The orchestration layer for the Lattice framework.
//!
//! This crate provides:
//! - The [`App`] shell owning compilers, trees and lifecycle handlers
//! - Layered figment configuration (`lattice.toml`, `LATTICE_*` env)
//! - Tracing-based logging setup driven by configuration
//!
//! ```rust,ignore
//! use lattice_runtime::App;
//!
//! #[tokio::main]
//! async fn main() -> lattice_runtime::AppResult<()> {
//!     let mut app = App::from_default_config()?;
//!     app.init_logging();
//!     app.add_module(my_module())?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

pub use app::{App, ExecutionContext};
pub use config::{AppConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig};
pub use error::{AppError, AppResult};
pub use logging::LoggingBuilder;
