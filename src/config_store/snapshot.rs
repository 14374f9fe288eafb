use std::collections::{BTreeMap, BTreeSet};

use crate::source::{ValueMap, key};

/// Immutable point-in-time view of every visible key.
///
/// Values are stored as persisted: encrypted values keep their marker prefix.
/// A snapshot is never mutated once published; updates build a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSnapshot {
    values: ValueMap,
    generation: u64,
}

impl MergedSnapshot {
    pub fn new(values: ValueMap, generation: u64) -> Self {
        Self { values, generation }
    }

    /// Monotonic counter bumped on every replacement.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entry for `key`: `None` if not visible, `Some(None)` if visible but null.
    pub fn lookup(&self, key: &str) -> Option<&Option<String>> {
        self.values.get(key)
    }

    /// Non-null value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Option::as_deref)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Visible keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Entries sorted by key.
    pub fn sorted(&self) -> BTreeMap<&str, Option<&str>> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every key under `prefix`, with the prefix stripped.
    ///
    /// An empty prefix returns the whole snapshot.
    pub fn section(&self, prefix: &str) -> BTreeMap<String, Option<String>> {
        self.values
            .iter()
            .filter_map(|(k, v)| key::strip_section(k, prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect()
    }

    /// Distinct immediate child segments under `prefix`, sorted.
    pub fn child_keys(&self, prefix: &str) -> Vec<String> {
        self.values
            .keys()
            .filter_map(|k| key::child_segment(k, prefix))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Copy with `updates` applied; `None` removes the key.
    pub fn with_updates<I>(&self, updates: I, generation: u64) -> Self
    where
        I: IntoIterator<Item = (String, Option<Option<String>>)>,
    {
        let mut values = self.values.clone();
        for (key, entry) in updates {
            match entry {
                Some(value) => {
                    values.insert(key, value);
                }
                None => {
                    values.remove(&key);
                }
            }
        }
        Self { values, generation }
    }

    /// Underlying map.
    pub fn values(&self) -> &ValueMap {
        &self.values
    }
}
