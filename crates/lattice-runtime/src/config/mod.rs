//! Configuration module for the Lattice runtime.
//!
//! Layered loading (defaults → programmatic overrides → config file →
//! `LATTICE_*` environment variables) over a serde schema. The `custom`
//! section is opaque to the runtime; it is the value handed to compiler
//! passes at module registration time.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{
    AppConfig, Environment, FrameworkConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
};
