use std::{io, path::PathBuf, result};

use thiserror::Error;

/// Error types for the configuration engine.
///
/// Every failure the engine can surface to a caller is one of these variants.
/// Details are carried as strings so an error can be cloned into reload error
/// records and fanned out to every subscriber.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required source is missing or could not be parsed while building
    #[error("failed to load source '{name}': {details}")]
    SourceLoad {
        /// Name of the source that failed
        name: String,
        /// Load error details
        details: String,
    },

    /// The backing store of a source does not exist
    #[error("backing store of source '{name}' is missing")]
    SourceMissing {
        /// Name of the source whose backing store is missing
        name: String,
    },

    /// No writeable source matches the requested write target
    #[error("no writeable source{}", level_suffix(.level))]
    NoWritableSource {
        /// Level that was explicitly requested, if any
        level: Option<i32>,
    },

    /// A source refused a save because it is read-only
    #[error("source '{name}' is read-only")]
    ReadOnlySource {
        /// Name of the read-only source
        name: String,
    },

    /// Persisting a pending overlay to its backing store failed
    #[error("failed to persist source '{name}': {details}")]
    Persist {
        /// Name of the source being persisted
        name: String,
        /// Persistence error details
        details: String,
    },

    /// A save was cancelled before it completed
    #[error("save of source '{name}' was cancelled")]
    Cancelled {
        /// Name of the source whose save was cancelled
        name: String,
    },

    /// Ciphertext was tampered with or encrypted under another key
    #[error("failed to decrypt value for '{key}': {details}")]
    Decryption {
        /// Key whose value failed to decrypt
        key: String,
        /// Decryption error details
        details: String,
    },

    /// The cipher provider failed to encrypt a value
    #[error("failed to encrypt value for '{key}': {details}")]
    Encryption {
        /// Key whose value failed to encrypt
        key: String,
        /// Encryption error details
        details: String,
    },

    /// A value could not be converted to the requested type
    #[error("failed to convert '{value}' to {target}: {details}")]
    Conversion {
        /// Raw string value
        value: String,
        /// Name of the requested type
        target: &'static str,
        /// Conversion error details
        details: String,
    },

    /// A template reference chain refers back to itself
    #[error("circular reference detected: {chain}")]
    CircularReference {
        /// Rendered reference chain, e.g. `A -> B -> A`
        chain: String,
    },

    /// A template expansion nested deeper than allowed
    #[error("template expansion exceeded maximum depth of {max_depth}")]
    MaxRecursionExceeded {
        /// Configured maximum depth
        max_depth: usize,
    },

    /// Reloading one or more sources failed
    #[error("reload of source '{name}' failed: {details}")]
    Reload {
        /// Name of the source that failed to reload
        name: String,
        /// Reload error details
        details: String,
    },

    /// A file watch could not be established or failed while running
    #[error("file watcher error for '{path}': {details}")]
    FileWatch {
        /// Path being watched
        path: PathBuf,
        /// Watcher error details
        details: String,
    },

    /// A key pattern could not be compiled
    #[error("invalid key pattern '{pattern}': {details}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Compilation error details
        details: String,
    },

    /// Engine settings could not be parsed
    #[error("invalid engine settings from {location}: {details}")]
    Settings {
        /// Where the settings came from (file path or "string")
        location: String,
        /// Parse error details
        details: String,
    },

    /// I/O error on a path
    #[error("I/O error on '{path}': {details}")]
    Io {
        /// Path where the I/O error occurred
        path: PathBuf,
        /// I/O error details
        details: String,
    },
}

fn level_suffix(level: &Option<i32>) -> String {
    level.map(|l| format!(" at level {l}")).unwrap_or_default()
}

/// A specialized `Result` type for configuration engine operations.
pub type Result<T> = result::Result<T, ConfigError>;

impl ConfigError {
    /// Creates an I/O error with path context.
    pub fn io(error: &io::Error, path: impl Into<PathBuf>) -> Self {
        ConfigError::Io {
            path: path.into(),
            details: error.to_string(),
        }
    }

    /// Creates a conversion error for the target type `T`.
    pub fn conversion<T>(value: &str, details: impl ToString) -> Self {
        ConfigError::Conversion {
            value: value.to_string(),
            target: std::any::type_name::<T>(),
            details: details.to_string(),
        }
    }
}
