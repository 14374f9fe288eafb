use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::ConfigError;

/// How a key's visible value changed between two merged snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The key was not visible before
    Added,
    /// The key was visible with a different value
    Modified,
    /// The key is no longer visible
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A single key difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Hierarchical key that changed.
    pub key: String,
    /// Value before the change, `None` if absent or null.
    pub old_value: Option<String>,
    /// Value after the change, `None` if absent or null.
    pub new_value: Option<String>,
    /// Kind of change.
    pub kind: ChangeKind,
}

impl ChangeRecord {
    /// Creates a record.
    pub fn new(
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        kind: ChangeKind,
    ) -> Self {
        Self {
            key: key.into(),
            old_value,
            new_value,
            kind,
        }
    }
}

/// One coalesced set of changes published after a reload cycle.
///
/// Never constructed empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    /// Changes keyed by hierarchical key.
    pub changes: BTreeMap<String, ChangeRecord>,
    /// When the batch was computed.
    pub timestamp: DateTime<Utc>,
    /// Unique identifier of the batch.
    pub batch_id: Uuid,
}

impl ChangeBatch {
    /// Wraps `changes` into a batch, or returns `None` if there are none.
    pub fn new(changes: BTreeMap<String, ChangeRecord>) -> Option<Self> {
        if changes.is_empty() {
            return None;
        }

        Some(Self {
            changes,
            timestamp: Utc::now(),
            batch_id: Uuid::new_v4(),
        })
    }

    /// Change for `key`, if it is part of this batch.
    pub fn get(&self, key: &str) -> Option<&ChangeRecord> {
        self.changes.get(key)
    }

    /// Whether `key` changed in this batch.
    pub fn contains(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    /// Changed keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Published in place of a batch when a reload attempt fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadErrorRecord {
    /// Levels of the sources that failed to reload.
    pub affected_levels: BTreeSet<i32>,
    /// First failure encountered.
    pub error: ConfigError,
    /// Whether the previous merged snapshot was kept.
    pub rolled_back: bool,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ReloadErrorRecord {
    pub fn new(affected_levels: BTreeSet<i32>, error: ConfigError, rolled_back: bool) -> Self {
        Self {
            affected_levels,
            error,
            rolled_back,
            timestamp: Utc::now(),
        }
    }
}

/// An item delivered on the change stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A reload cycle produced visible changes
    Batch(ChangeBatch),
    /// A reload cycle failed
    Error(ReloadErrorRecord),
    /// The store was disposed; nothing follows
    Completed,
}

impl ChangeEvent {
    /// The batch carried by this event, if any.
    pub fn as_batch(&self) -> Option<&ChangeBatch> {
        match self {
            Self::Batch(batch) => Some(batch),
            _ => None,
        }
    }

    /// The error record carried by this event, if any.
    pub fn as_error(&self) -> Option<&ReloadErrorRecord> {
        match self {
            Self::Error(record) => Some(record),
            _ => None,
        }
    }
}
