use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;

type CacheKey = (String, TypeId);

/// Versioned memoisation of converted values, keyed by `(key, type)`.
///
/// The version belongs to the cache as a whole. Invalidation and clearing bump
/// it; priming does not. A reader captures [`ValueCache::version`] before
/// computing a value and primes with [`ValueCache::set_value_if_current`], so
/// a value computed from a superseded snapshot is never stored.
#[derive(Default)]
pub struct ValueCache {
    entries: RwLock<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
    version: AtomicU64,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Cached value of type `T` for `key`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.entries
            .read()
            .get(&(key.to_string(), TypeId::of::<T>()))
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Primes the cache without bumping the version.
    pub fn set_value<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        self.entries
            .write()
            .insert((key.to_string(), TypeId::of::<T>()), Arc::new(value));
    }

    /// Primes the cache only if nothing was invalidated since `version`.
    pub fn set_value_if_current<T: Send + Sync + 'static>(&self, key: &str, value: T, version: u64) -> bool {
        let mut entries = self.entries.write();
        if self.version.load(Ordering::Acquire) != version {
            return false;
        }
        entries.insert((key.to_string(), TypeId::of::<T>()), Arc::new(value));
        true
    }

    /// Drops every typed entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.invalidate_many([key]);
    }

    /// Drops every typed entry for each of `keys`, bumping the version once.
    pub fn invalidate_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        let mut entries = self.entries.write();
        for key in keys {
            entries.retain(|(k, _), _| k != key);
        }
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops everything.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
