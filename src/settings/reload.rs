use std::{fmt, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// When the reload pipeline recomputes the merged snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReloadStrategy {
    /// Every debounced change signal reloads, diffs and publishes immediately.
    #[default]
    Eager,

    /// Change signals reload the affected sources but defer the merge and
    /// publication to the next read.
    Lazy,

    /// Change signals are ignored; only an explicit reload recomputes.
    Manual,
}

impl fmt::Display for ReloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadStrategy::Eager => write!(f, "eager"),
            ReloadStrategy::Lazy => write!(f, "lazy"),
            ReloadStrategy::Manual => write!(f, "manual"),
        }
    }
}

/// Dynamic reload and change-notification settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ReloadOptions {
    /// Reload strategy applied to change signals.
    pub strategy: ReloadStrategy,

    /// Quiet period in milliseconds a burst of change signals must settle for
    /// before one reload cycle runs.
    pub debounce_ms: u64,

    /// Keep the previous snapshot when any affected source fails to reload.
    pub rollback_on_error: bool,

    /// Number of published change batches kept for inspection. Zero disables history.
    pub history_size: usize,

    /// Only changes to keys starting with one of these prefixes are published.
    /// Empty publishes every change.
    pub key_prefix_filters: Vec<String>,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            strategy: ReloadStrategy::Eager,
            debounce_ms: 100,
            rollback_on_error: true,
            history_size: 10,
            key_prefix_filters: Vec::new(),
        }
    }
}

impl ReloadOptions {
    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether a change to `key` passes the prefix filters.
    pub fn publishes(&self, key: &str) -> bool {
        self.key_prefix_filters.is_empty()
            || self
                .key_prefix_filters
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
    }
}
