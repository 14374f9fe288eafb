use std::collections::HashMap;

use crate::source::ValueMap;

/// An uncommitted edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Value to persist; `None` for removals.
    pub new_value: Option<String>,
    /// Whether the edit deletes the key.
    pub is_removal: bool,
    revision: u64,
}

impl PendingEntry {
    /// Value this entry makes visible: `None` hides the key.
    pub fn visible(&self) -> Option<Option<String>> {
        (!self.is_removal).then(|| self.new_value.clone())
    }
}

/// Revisions captured when a save starts, used to clear only what was saved.
pub type CommitToken = HashMap<String, u64>;

/// Per-source buffer of edits not yet persisted.
///
/// Every edit gets a fresh revision so that a save can clear exactly the
/// entries it persisted, leaving edits made while it was in flight.
#[derive(Debug, Default)]
pub struct PendingOverlay {
    entries: HashMap<String, PendingEntry>,
    next_revision: u64,
}

impl PendingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key.into(), Some(value.into()), false);
    }

    /// Records removal of `key`.
    pub fn remove(&mut self, key: impl Into<String>) {
        self.insert(key.into(), None, true);
    }

    fn insert(&mut self, key: String, new_value: Option<String>, is_removal: bool) {
        self.next_revision += 1;
        self.entries.insert(
            key,
            PendingEntry {
                new_value,
                is_removal,
                revision: self.next_revision,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&PendingEntry> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in arbitrary order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &PendingEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Delta to hand to the source's save, plus the token to commit it with.
    pub fn delta(&self) -> (ValueMap, CommitToken) {
        let delta = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.new_value.clone()))
            .collect();
        let token = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.revision))
            .collect();
        (delta, token)
    }

    /// Drops entries unchanged since `token` was taken.
    pub fn commit(&mut self, token: &CommitToken) {
        self.entries
            .retain(|k, e| token.get(k).is_none_or(|revision| *revision != e.revision));
    }

    /// Drops every entry, returning the affected keys.
    pub fn clear(&mut self) -> Vec<String> {
        self.entries.drain().map(|(k, _)| k).collect()
    }
}
