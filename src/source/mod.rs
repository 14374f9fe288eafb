//! Configuration source contract.
//!
//! A source is one backing store of configuration values (a file, a remote
//! key/value store, the process environment). The engine consumes sources
//! polymorphically through [`ConfigSource`] and never branches on the concrete
//! type. Each source normalises its native key representation into the
//! `:`-separated form described in [`key`].

pub mod env;
pub mod file;
mod file_watcher;
pub mod key;
pub mod memory;

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{ConfigError, Result};

pub use env::EnvironmentSource;
pub use file::TomlFileSource;
pub use file_watcher::FileWatcher;
pub use memory::MemorySource;

/// Mapping from normalised key to nullable value.
///
/// Loaded snapshots use `None` for keys that are present without a value; save
/// deltas use `None` to mean removal.
pub type ValueMap = HashMap<String, Option<String>>;

/// Registration metadata for a source.
///
/// `level` is the sole ordering key: higher levels override lower ones, and
/// sources registered later override earlier ones at the same level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Override priority, higher wins
    pub level: i32,
    /// Whether the source accepts pending writes
    pub writeable: bool,
    /// Whether the source is the preferred write target at its level
    pub primary_writer: bool,
    /// Whether a missing backing store is tolerated
    pub optional: bool,
    /// Whether external changes to the source trigger the reload pipeline
    pub reload_on_change: bool,
}

impl SourceOptions {
    /// Read-only, required, non-reloading options at `level`.
    pub fn at_level(level: i32) -> Self {
        Self {
            level,
            writeable: false,
            primary_writer: false,
            optional: false,
            reload_on_change: false,
        }
    }

    /// Marks the source writeable.
    pub fn writeable(mut self) -> Self {
        self.writeable = true;
        self
    }

    /// Marks the source writeable and the preferred write target at its level.
    pub fn primary_writer(mut self) -> Self {
        self.writeable = true;
        self.primary_writer = true;
        self
    }

    /// Tolerates a missing backing store.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Registers the source with the reload pipeline.
    pub fn reload_on_change(mut self) -> Self {
        self.reload_on_change = true;
        self
    }
}

/// Handle a source uses to tell the engine its backing store changed.
///
/// Cloning is cheap; every clone reports against the same registered source.
#[derive(Clone)]
pub struct ReloadSignal {
    source_id: usize,
    sender: mpsc::UnboundedSender<usize>,
}

impl ReloadSignal {
    pub(crate) fn new(source_id: usize, sender: mpsc::UnboundedSender<usize>) -> Self {
        Self { source_id, sender }
    }

    /// Reports a raw change signal. Returns `false` once the engine stopped listening.
    pub fn notify(&self) -> bool {
        self.sender.send(self.source_id).is_ok()
    }
}

impl fmt::Debug for ReloadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadSignal")
            .field("source_id", &self.source_id)
            .finish()
    }
}

/// Keeps a source's watch registration alive; dropping it stops the watch.
pub struct WatchGuard {
    _inner: Box<dyn Send + Sync>,
}

impl WatchGuard {
    /// Wraps any watch resource (watcher handle, task handle, token).
    pub fn new<T: Send + Sync + 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// A backing store of configuration values.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human-readable name for logs and errors.
    fn name(&self) -> &str;

    /// Loads the full snapshot of the store.
    ///
    /// # Errors
    /// * `ConfigError::SourceMissing` - If the backing store does not exist
    /// * any other variant if the store exists but cannot be read or parsed
    async fn load(&self) -> Result<ValueMap>;

    /// Applies a delta to the backing store; `None` values are removals.
    ///
    /// # Errors
    /// Returns `ConfigError::ReadOnlySource` by default, or the source's
    /// persistence error.
    async fn save(&self, _delta: &ValueMap) -> Result<()> {
        Err(ConfigError::ReadOnlySource {
            name: self.name().to_string(),
        })
    }

    /// Whether the source can push change signals at all.
    fn supports_reload(&self) -> bool {
        false
    }

    /// Starts watching the backing store, reporting changes through `signal`.
    ///
    /// # Errors
    /// Returns an error if the watch cannot be established.
    fn watch(&self, _signal: ReloadSignal) -> Result<Option<WatchGuard>> {
        Ok(None)
    }
}
