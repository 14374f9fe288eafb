use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{ConfigSource, ReloadSignal, ValueMap, WatchGuard};
use crate::core::{ConfigError, Result};

/// In-memory key/value store.
///
/// Behaves like a remote store that pushes change notifications: external
/// writers call [`MemorySource::inject`] or [`MemorySource::remove_external`],
/// which mutate the backing map and raise a reload signal.
pub struct MemorySource {
    name: String,
    values: RwLock<ValueMap>,
    signal: Mutex<Option<ReloadSignal>>,
    failing: AtomicBool,
    load_delay: Option<Duration>,
    save_delay: Option<Duration>,
    save_count: AtomicUsize,
    saves_in_flight: AtomicUsize,
    max_saves_in_flight: AtomicUsize,
}

impl MemorySource {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: RwLock::new(ValueMap::new()),
            signal: Mutex::new(None),
            failing: AtomicBool::new(false),
            load_delay: None,
            save_delay: None,
            save_count: AtomicUsize::new(0),
            saves_in_flight: AtomicUsize::new(0),
            max_saves_in_flight: AtomicUsize::new(0),
        }
    }

    /// Creates a store pre-populated with `values`.
    pub fn with_values<K, V>(name: impl Into<String>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let source = Self::new(name);
        {
            let mut map = source.values.write();
            for (key, value) in values {
                map.insert(key.into(), Some(value.into()));
            }
        }
        source
    }

    /// Delays every save by `delay`, simulating a slow network store.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    /// Delays every load by `delay` after the values have been read.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Writes a value as an external party would and signals the change.
    pub fn inject(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), Some(value.into()));
        self.notify();
    }

    /// Removes a value as an external party would and signals the change.
    pub fn remove_external(&self, key: &str) {
        self.values.write().remove(key);
        self.notify();
    }

    /// Makes subsequent loads and saves fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raises a reload signal without changing any value.
    pub fn notify(&self) {
        if let Some(signal) = self.signal.lock().as_ref() {
            signal.notify();
        }
    }

    /// Number of saves that reached the backing map.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Highest number of saves that were running at the same time.
    pub fn max_concurrent_saves(&self) -> usize {
        self.max_saves_in_flight.load(Ordering::SeqCst)
    }

    /// Current backing value for `key`, bypassing the engine.
    pub fn stored(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned().flatten()
    }

    async fn apply_save(&self, delta: &ValueMap) -> Result<()> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failing("save")?;

        let mut values = self.values.write();
        for (key, value) in delta {
            match value {
                Some(v) => {
                    values.insert(key.clone(), Some(v.clone()));
                }
                None => {
                    values.remove(key);
                }
            }
        }
        self.save_count.fetch_add(1, Ordering::SeqCst);
        debug!(source = %self.name, entries = delta.len(), "Saved delta to memory source");
        Ok(())
    }

    fn check_failing(&self, operation: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigError::Io {
                path: self.name.clone().into(),
                details: format!("simulated {operation} failure"),
            });
        }
        Ok(())
    }
}

/// Counts a running save; released on drop so cancelled saves are counted out too.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(running)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<ValueMap> {
        self.check_failing("load")?;
        let values = self.values.read().clone();
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(values)
    }

    async fn save(&self, delta: &ValueMap) -> Result<()> {
        let _in_flight = InFlight::enter(&self.saves_in_flight, &self.max_saves_in_flight);
        self.apply_save(delta).await
    }

    fn supports_reload(&self) -> bool {
        true
    }

    fn watch(&self, signal: ReloadSignal) -> Result<Option<WatchGuard>> {
        *self.signal.lock() = Some(signal);
        Ok(None)
    }
}
