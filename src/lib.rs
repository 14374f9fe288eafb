//! Confstack - layered, hot-reloadable configuration engine.
//!
//! Values come from any number of sources (TOML files, the process
//! environment, in-memory stores) registered at integer levels; higher levels
//! override lower ones. The main features include:
//!
//! - Pending writes buffered per source and persisted on save
//! - Debounced reloads with atomic snapshot swaps and change batches
//! - Transparent encryption and masking of sensitive keys
//! - `${...}` references with cycle detection
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use confstack::{
//!     config_store::ConfigStore,
//!     source::{SourceOptions, TomlFileSource},
//! };
//!
//! # async fn run() -> confstack::Result<()> {
//! let store = ConfigStore::builder()
//!     .add_source(TomlFileSource::new("app.toml"), SourceOptions::at_level(0).writeable())
//!     .build()
//!     .await?;
//!
//! let port: u16 = store.get_value("Server:Port")?;
//! println!("Listening on {port}");
//! # Ok(())
//! # }
//! ```

/// Command-line interface over a configuration store.
pub mod cli;

/// Layered configuration store with reload pipeline and change stream.
pub mod config_store;

/// Typed conversion of raw configuration strings.
pub mod convert;

/// Core error types and result aliases.
pub mod core;

/// Engine settings.
pub mod settings;

/// Configuration source contract and built-in sources.
pub mod source;

/// `${...}` reference expansion.
pub mod template;

/// Logging setup for the binary.
pub mod tracing_config;

/// Value encryption and masking.
pub mod transform;

/// Re-exported core types for convenience.
pub use core::{ConfigError, Result};
