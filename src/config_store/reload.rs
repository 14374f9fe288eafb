use std::{
    collections::{BTreeSet, HashSet},
    sync::atomic::Ordering,
};

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use super::{
    changes::{ChangeBatch, ChangeEvent, ReloadErrorRecord},
    registry::Descriptor,
    store::{ConfigStore, StoreInner},
};
use crate::{
    core::{ConfigError, Result},
    settings::ReloadStrategy,
    source::ValueMap,
};

async fn load_descriptor(descriptor: &Descriptor) -> Result<ValueMap> {
    match descriptor.source.load().await {
        Ok(values) => Ok(values),
        Err(ConfigError::SourceMissing { .. }) if descriptor.options.optional => {
            debug!(source = descriptor.name(), "Optional source missing, treating as empty");
            Ok(ValueMap::new())
        }
        Err(e) => Err(ConfigError::Reload {
            name: descriptor.name().to_string(),
            details: e.to_string(),
        }),
    }
}

impl StoreInner {
    /// Reloads the descriptors named by `ids` (all when `None`).
    ///
    /// On success the loaded data is replaced and, when `publish_now` is set,
    /// the snapshot is recomputed and the resulting batch published; otherwise
    /// the snapshot is only marked dirty. On failure an error record is
    /// published and, with rollback enabled, nothing is applied. A descriptor
    /// being reloaded cannot be saved until its new data is in place.
    #[instrument(skip(self, ids))]
    pub async fn reload_sources(&self, ids: Option<&HashSet<usize>>, publish_now: bool) -> Result<Option<ChangeBatch>> {
        let targets: Vec<_> = self
            .registry
            .descriptors()
            .iter()
            .filter(|d| ids.is_none_or(|ids| ids.contains(&d.id)))
            .cloned()
            .collect();

        // Each save lock is held from load until the loaded data is replaced, so
        // a save committing in between cannot be overwritten by an older load.
        let results = join_all(targets.iter().map(|d| async move {
            let guard = d.save_lock.lock().await;
            (guard, load_descriptor(d).await)
        }))
        .await;

        let mut save_guards = Vec::with_capacity(results.len());
        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        for (descriptor, (guard, result)) in targets.iter().zip(results) {
            save_guards.push(guard);
            match result {
                Ok(values) => loaded.push((descriptor, values)),
                Err(e) => failed.push((descriptor, e)),
            }
        }

        let failure = failed.first().map(|(_, e)| e.clone());
        let affected_levels: BTreeSet<i32> = failed.iter().map(|(d, _)| d.level()).collect();
        let rollback = failure.is_some() && self.settings.reload.rollback_on_error;

        let batch = if rollback {
            None
        } else {
            let lock = self.lock_publish();
            for (descriptor, values) in loaded {
                descriptor.replace_loaded(values);
            }
            if publish_now {
                self.swap_full(&lock)
            } else {
                self.dirty.store(true, Ordering::Release);
                None
            }
        };

        drop(save_guards);

        if let Some(batch) = &batch {
            self.publish_batch(batch);
        }

        match failure {
            Some(error) => {
                warn!(
                    error = %error,
                    levels = ?affected_levels,
                    rolled_back = rollback,
                    "Reload failed"
                );
                let record = ReloadErrorRecord::new(affected_levels, error.clone(), rollback);
                self.stream.publish(&ChangeEvent::Error(record));
                Err(error)
            }
            None => Ok(batch),
        }
    }

    /// One debounced cycle driven by change signals.
    pub async fn run_reload_cycle(&self, ids: &HashSet<usize>) {
        let publish_now = match self.settings.reload.strategy {
            ReloadStrategy::Eager => true,
            ReloadStrategy::Lazy => false,
            ReloadStrategy::Manual => return,
        };

        debug!(sources = ids.len(), publish_now, "Running reload cycle");
        // Failures are published as error records.
        let _ = self.reload_sources(Some(ids), publish_now).await;
    }
}

impl ConfigStore {
    /// Reloads every source now, whatever the reload strategy, and publishes
    /// the resulting batch.
    ///
    /// Returns the published batch, or `None` if nothing visible changed.
    ///
    /// # Errors
    /// Returns the first `ConfigError::Reload`; the matching error record has
    /// already been published.
    pub async fn reload(&self) -> Result<Option<ChangeBatch>> {
        self.inner.reload_sources(None, true).await
    }
}
