use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;
use futures::future::join_all;
use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{
    broadcast::{ChangeStream, HandlerSubscription, Subscription},
    builder::ConfigStoreBuilder,
    cache::ValueCache,
    changes::{ChangeBatch, ChangeEvent},
    diff::diff_snapshots,
    history::ChangeHistory,
    pending::{CommitToken, PendingEntry},
    persist::persist,
    registry::{Descriptor, ResolvedValue, SourceInfo, SourceRegistry},
    snapshot::MergedSnapshot,
};
use crate::{
    convert::FromConfigValue,
    core::Result,
    settings::EngineSettings,
    source::{ValueMap, WatchGuard},
    template::{TemplateResolver, ValueLookup},
    transform::TransformPipeline,
};

/// Layered configuration store.
///
/// Merges every registered source by level, buffers writes per source until
/// [`ConfigStore::save`], transforms values transparently on the way in and
/// out, expands `${...}` references on request and publishes change batches
/// when sources change underneath it.
///
/// Cloning is cheap; clones share one store. The store is disposed by
/// [`ConfigStore::close`], [`ConfigStore::shutdown`], or when the last clone
/// is dropped.
#[derive(Clone)]
pub struct ConfigStore {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub settings: EngineSettings,
    pub registry: SourceRegistry,
    snapshot: ArcSwap<MergedSnapshot>,
    publish_lock: Mutex<()>,
    generation: AtomicU64,
    pub dirty: AtomicBool,
    pub cache: ValueCache,
    pub transform: TransformPipeline,
    pub templates: TemplateResolver,
    pub stream: ChangeStream,
    history: Mutex<ChangeHistory>,
    pub shutdown: CancellationToken,
    pub watch_guards: Mutex<Vec<WatchGuard>>,
    pub reload_task: Mutex<Option<JoinHandle<()>>>,
}

/// Read-through lookup against one snapshot, used by template expansion.
struct SnapshotLookup<'a> {
    snapshot: &'a MergedSnapshot,
    transform: &'a TransformPipeline,
}

impl ValueLookup for SnapshotLookup<'_> {
    fn lookup(&self, key: &str) -> Result<Option<String>> {
        match self.snapshot.lookup(key) {
            Some(value) => self.transform.on_read(key, value.as_deref()),
            None => Ok(None),
        }
    }
}

impl StoreInner {
    pub fn new(
        settings: EngineSettings,
        registry: SourceRegistry,
        transform: TransformPipeline,
        templates: TemplateResolver,
    ) -> Self {
        let initial = MergedSnapshot::new(registry.merge(), 0);
        let history = ChangeHistory::new(settings.reload.history_size);

        Self {
            settings,
            registry,
            snapshot: ArcSwap::from_pointee(initial),
            publish_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            cache: ValueCache::new(),
            transform,
            templates,
            stream: ChangeStream::new(),
            history: Mutex::new(history),
            shutdown: CancellationToken::new(),
            watch_guards: Mutex::new(Vec::new()),
            reload_task: Mutex::new(None),
        }
    }

    /// Current snapshot, first folding in deferred reloads.
    pub fn current(&self) -> Arc<MergedSnapshot> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            debug!("Applying deferred reload on read");
            self.recompute_and_publish();
        }
        self.snapshot.load_full()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn lock_publish(&self) -> MutexGuard<'_, ()> {
        self.publish_lock.lock()
    }

    /// Rebuilds the snapshot from every descriptor and swaps it in. Returns the
    /// filtered batch to publish, if any. The caller holds the publish lock.
    pub fn swap_full(&self, _lock: &MutexGuard<'_, ()>) -> Option<ChangeBatch> {
        let old = self.snapshot.load_full();
        let new = MergedSnapshot::new(self.registry.merge(), self.next_generation());

        let changes = diff_snapshots(&old, &new, |_| true);
        if changes.is_empty() {
            return None;
        }

        self.snapshot.store(Arc::new(new));
        self.cache.invalidate_many(changes.keys().map(String::as_str));

        let visible: BTreeMap<_, _> = changes
            .into_iter()
            .filter(|(key, _)| self.settings.reload.publishes(key))
            .collect();

        let batch = ChangeBatch::new(visible)?;
        self.history.lock().push(batch.clone());
        Some(batch)
    }

    /// Re-resolves `keys` and swaps in a patched snapshot. The caller holds the
    /// publish lock.
    fn patch_keys(&self, _lock: &MutexGuard<'_, ()>, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        let old = self.snapshot.load_full();
        let updates = keys.iter().map(|key| (key.clone(), self.registry.visible(key)));
        let new = old.with_updates(updates, self.next_generation());

        self.snapshot.store(Arc::new(new));
        self.cache.invalidate_many(keys.iter().map(String::as_str));
    }

    pub fn recompute_and_publish(&self) -> Option<ChangeBatch> {
        let batch = {
            let lock = self.lock_publish();
            self.swap_full(&lock)
        };

        if let Some(batch) = &batch {
            self.publish_batch(batch);
        }
        batch
    }

    pub fn publish_batch(&self, batch: &ChangeBatch) {
        info!(
            batch_id = %batch.batch_id,
            changes = batch.len(),
            "Publishing change batch"
        );
        self.stream.publish(&ChangeEvent::Batch(batch.clone()));
    }

    fn commit_saved(&self, descriptor: &Descriptor, delta: &ValueMap, token: &CommitToken) {
        let lock = self.lock_publish();
        descriptor.pending().commit(token);
        descriptor.apply_delta(delta);
        let keys: Vec<String> = delta.keys().cloned().collect();
        self.patch_keys(&lock, &keys);
    }

    fn read(&self, snapshot: &MergedSnapshot, key: &str) -> Result<Option<String>> {
        SnapshotLookup {
            snapshot,
            transform: &self.transform,
        }
        .lookup(key)
    }

    fn dispose(&self) -> bool {
        self.shutdown.cancel();
        self.watch_guards.lock().clear();
        self.stream.complete()
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl ConfigStore {
    /// Starts building a store.
    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    /// Engine settings the store was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Current value of `key`, decrypted.
    ///
    /// Returns `Ok(None)` if the key is absent or present without a value.
    ///
    /// # Errors
    /// Returns `ConfigError::Decryption` if the stored value is tagged as
    /// ciphertext but cannot be decrypted.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let snapshot = self.inner.current();
        self.inner.read(&snapshot, key)
    }

    /// Whether `key` is visible, with or without a value.
    pub fn exists(&self, key: &str) -> bool {
        self.inner.current().contains(key)
    }

    /// Winning stored value for `key` together with the source that supplied it.
    ///
    /// Reads the live registry including pending edits; values are returned as
    /// stored, without decryption.
    pub fn resolve(&self, key: &str) -> Option<ResolvedValue> {
        self.inner.registry.resolve(key)
    }

    /// Reads `keys` from one snapshot, invoking `callback` in the order given.
    ///
    /// # Errors
    /// Stops at and returns the first decryption error.
    pub fn get_many<F>(&self, keys: &[&str], mut callback: F) -> Result<()>
    where
        F: FnMut(&str, Option<String>),
    {
        let snapshot = self.inner.current();
        for key in keys {
            let value = self.inner.read(&snapshot, key)?;
            callback(key, value);
        }
        Ok(())
    }

    fn typed<T: FromConfigValue>(&self, key: &str) -> Result<Option<T>> {
        if let Some(value) = self.inner.cache.get::<T>(key) {
            return Ok(Some(value));
        }

        // Version before snapshot: a write landing in between bumps the version
        // and the stale conversion is not cached.
        let version = self.inner.cache.version();
        let snapshot = self.inner.current();
        let Some(raw) = self.inner.read(&snapshot, key)? else {
            return Ok(None);
        };

        match T::from_config_value(&raw) {
            Ok(value) => {
                self.inner
                    .cache
                    .set_value_if_current(key, value.clone(), version);
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key, error = %e, "Conversion failed, falling back to default");
                Ok(None)
            }
        }
    }

    /// Typed value of `key`, memoised per type.
    ///
    /// Absent keys and values that fail to convert yield `T::default()`.
    ///
    /// # Errors
    /// Returns `ConfigError::Decryption` if the stored ciphertext is invalid.
    pub fn get_value<T: FromConfigValue>(&self, key: &str) -> Result<T> {
        Ok(self.typed(key)?.unwrap_or_default())
    }

    /// Typed value of `key`, or `default` if absent or not convertible.
    ///
    /// # Errors
    /// Returns `ConfigError::Decryption` if the stored ciphertext is invalid.
    pub fn get_value_or<T: FromConfigValue>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.typed(key)?.unwrap_or(default))
    }

    /// Value of `key` with every `${...}` reference expanded.
    ///
    /// # Errors
    /// * `ConfigError::CircularReference` - If references form a cycle
    /// * `ConfigError::MaxRecursionExceeded` - If references nest too deeply
    /// * `ConfigError::Decryption` - If a referenced value cannot be decrypted
    pub fn get_resolved(&self, key: &str) -> Result<Option<String>> {
        let snapshot = self.inner.current();
        let lookup = SnapshotLookup {
            snapshot: &snapshot,
            transform: &self.inner.transform,
        };

        match lookup.lookup(key)? {
            Some(raw) => self.inner.templates.resolve(&raw, &lookup).map(Some),
            None => Ok(None),
        }
    }

    /// Typed value of `key` after reference expansion. Not memoised.
    ///
    /// # Errors
    /// Same as [`ConfigStore::get_resolved`]; conversion failures yield `T::default()`.
    pub fn get_resolved_value<T: FromConfigValue>(&self, key: &str) -> Result<T> {
        let Some(resolved) = self.get_resolved(key)? else {
            return Ok(T::default());
        };

        Ok(T::from_config_value(&resolved).unwrap_or_else(|e| {
            warn!(key, error = %e, "Conversion failed, falling back to default");
            T::default()
        }))
    }

    /// Expands every `${...}` reference in `text` against the current snapshot.
    ///
    /// # Errors
    /// Same as [`ConfigStore::get_resolved`].
    pub fn resolve_template(&self, text: &str) -> Result<String> {
        let snapshot = self.inner.current();
        let lookup = SnapshotLookup {
            snapshot: &snapshot,
            transform: &self.inner.transform,
        };
        self.inner.templates.resolve(text, &lookup)
    }

    /// Every key under `prefix` with the prefix stripped, decrypted.
    ///
    /// # Errors
    /// Returns the first decryption error.
    pub fn get_section(&self, prefix: &str) -> Result<BTreeMap<String, Option<String>>> {
        let snapshot = self.inner.current();
        snapshot
            .section(prefix)
            .into_iter()
            .map(|(child, value)| {
                let full = crate::source::key::join([prefix, child.as_str()]);
                self.inner
                    .transform
                    .on_read(&full, value.as_deref())
                    .map(|value| (child, value))
            })
            .collect()
    }

    /// Distinct immediate children of `prefix`.
    pub fn child_keys(&self, prefix: &str) -> Vec<String> {
        self.inner.current().child_keys(prefix)
    }

    /// Current merged snapshot, values as stored.
    pub fn snapshot(&self) -> Arc<MergedSnapshot> {
        self.inner.current()
    }

    /// Every key, decrypted and then masked, sorted by key.
    ///
    /// # Errors
    /// Returns the first decryption error.
    pub fn export_masked(&self) -> Result<BTreeMap<String, String>> {
        let snapshot = self.inner.current();
        snapshot
            .sorted()
            .into_iter()
            .map(|(key, value)| -> Result<(String, String)> {
                let plain = self.inner.transform.on_read(key, value)?;
                Ok((key.to_string(), self.inner.transform.mask(key, plain.as_deref())))
            })
            .collect()
    }

    /// Display form of `value` under `key`.
    pub fn mask(&self, key: &str, value: Option<&str>) -> String {
        self.inner.transform.mask(key, value)
    }

    /// Buffers `value` for `key` in the highest-level writeable source.
    ///
    /// Visible to reads immediately; persisted by [`ConfigStore::save`].
    ///
    /// # Errors
    /// * `ConfigError::NoWritableSource` - If no source is writeable
    /// * `ConfigError::Encryption` - If the key is sensitive and encryption fails
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value), None)
    }

    /// Buffers `value` for `key` in the writeable source at exactly `level`.
    ///
    /// # Errors
    /// * `ConfigError::NoWritableSource` - If no writeable source sits at `level`
    /// * `ConfigError::Encryption` - If the key is sensitive and encryption fails
    pub fn set_at(&self, level: i32, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value), Some(level))
    }

    /// Buffers removal of `key` in the highest-level writeable source. The
    /// removal hides the key at every lower level.
    ///
    /// # Errors
    /// Returns `ConfigError::NoWritableSource` if no source is writeable.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.write(key, None, None)
    }

    /// Buffers removal of `key` in the writeable source at exactly `level`.
    ///
    /// # Errors
    /// Returns `ConfigError::NoWritableSource` if no writeable source sits at `level`.
    pub fn remove_at(&self, level: i32, key: &str) -> Result<()> {
        self.write(key, None, Some(level))
    }

    fn write(&self, key: &str, value: Option<&str>, level: Option<i32>) -> Result<()> {
        let target = self.inner.registry.write_target(level)?;
        let stored = self.inner.transform.on_write(key, value)?;

        let lock = self.inner.lock_publish();
        match stored {
            Some(value) => target.pending().set(key, value),
            None => target.pending().remove(key),
        }
        self.inner.patch_keys(&lock, &[key.to_string()]);

        debug!(key, source = target.name(), removal = value.is_none(), "Buffered write");
        Ok(())
    }

    /// Persists pending edits: every writeable source when `level` is `None`,
    /// otherwise the write target at `level`. An unknown level is a no-op.
    ///
    /// # Errors
    /// Returns the first persistence error after every other source finished.
    pub async fn save(&self, level: Option<i32>) -> Result<()> {
        self.save_with_cancel(level, &CancellationToken::new()).await
    }

    /// [`ConfigStore::save`] with cancellation. A cancelled source keeps its
    /// pending edits.
    ///
    /// # Errors
    /// * `ConfigError::Cancelled` - If `cancel` fired before a source finished
    /// * `ConfigError::Persist` - If a source failed to persist
    #[instrument(skip(self, cancel))]
    pub async fn save_with_cancel(&self, level: Option<i32>, cancel: &CancellationToken) -> Result<()> {
        let targets = self.inner.registry.save_targets(level);
        if targets.is_empty() {
            debug!("No writeable source to save");
            return Ok(());
        }

        let inner = &self.inner;
        let results = join_all(targets.iter().map(|descriptor| {
            persist(descriptor, cancel, |delta, token| {
                inner.commit_saved(descriptor, delta, token)
            })
        }))
        .await;

        let mut persisted = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(count) => persisted += count,
                Err(e) => {
                    warn!(error = %e, "Save failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(persisted, "Saved pending edits");
        first_error.map_or(Ok(()), Err)
    }

    /// Drops pending edits without persisting them.
    pub fn discard(&self, level: Option<i32>) {
        let lock = self.inner.lock_publish();
        let keys: Vec<String> = self
            .inner
            .registry
            .save_targets(level)
            .iter()
            .flat_map(|descriptor| descriptor.pending().clear())
            .collect();
        self.inner.patch_keys(&lock, &keys);
        debug!(discarded = keys.len(), "Discarded pending edits");
    }

    /// Registered sources in override order, lowest first.
    pub fn sources(&self) -> Vec<SourceInfo> {
        self.inner.registry.infos()
    }

    /// Loaded values of the source that wins reads at `level`.
    pub fn source_values(&self, level: i32) -> Option<ValueMap> {
        self.inner
            .registry
            .at_level(level)
            .map(|descriptor| descriptor.loaded().as_ref().clone())
    }

    /// Pending edits of the write target at `level`.
    pub fn pending_changes(&self, level: i32) -> BTreeMap<String, PendingEntry> {
        self.inner
            .registry
            .write_target(Some(level))
            .map(|descriptor| {
                descriptor
                    .pending()
                    .entries()
                    .map(|(key, entry)| (key.to_string(), entry.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subscribes to change batches, reload errors and completion.
    pub fn subscribe(&self) -> Subscription {
        self.inner.stream.subscribe()
    }

    /// Subscribes a callback; it runs on the task that publishes.
    pub fn subscribe_with<F>(&self, handler: F) -> HandlerSubscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.stream.subscribe_with(handler)
    }

    /// Published batches, oldest first.
    pub fn change_history(&self) -> Vec<ChangeBatch> {
        self.inner.history.lock().batches()
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }

    /// Version of the typed value cache.
    pub fn cache_version(&self) -> u64 {
        self.inner.cache.version()
    }

    /// Drops every memoised typed value and cached pattern decision.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner.transform.clear_cache();
    }

    /// Disposes the store: stops watching, completes the change stream.
    ///
    /// Idempotent and safe to call concurrently; returns `true` only for the
    /// call that completed the stream. Every call returns after completion.
    pub fn close(&self) -> bool {
        let first = self.inner.dispose();
        if first {
            info!("Configuration store closed");
        }
        first
    }

    /// Disposes the store and waits for the reload loop to stop.
    pub async fn shutdown(&self) -> bool {
        let task = self.inner.reload_task.lock().take();
        let first = self.close();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Reload loop ended abnormally");
        }
        first
    }

    /// Whether the store was disposed.
    pub fn is_closed(&self) -> bool {
        self.inner.stream.is_completed()
    }
}
