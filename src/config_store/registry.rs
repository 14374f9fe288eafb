use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::pending::PendingOverlay;
use crate::{
    core::{ConfigError, Result},
    source::{ConfigSource, SourceOptions, ValueMap},
};

/// A registered source plus its metadata, loaded data and pending edits.
pub(crate) struct Descriptor {
    pub id: usize,
    pub options: SourceOptions,
    pub source: Arc<dyn ConfigSource>,
    loaded: RwLock<Arc<ValueMap>>,
    pending: Mutex<PendingOverlay>,
    pub save_lock: tokio::sync::Mutex<()>,
}

impl Descriptor {
    pub fn new(id: usize, options: SourceOptions, source: Arc<dyn ConfigSource>, loaded: ValueMap) -> Self {
        Self {
            id,
            options,
            source,
            loaded: RwLock::new(Arc::new(loaded)),
            pending: Mutex::new(PendingOverlay::new()),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn level(&self) -> i32 {
        self.options.level
    }

    pub fn loaded(&self) -> Arc<ValueMap> {
        self.loaded.read().clone()
    }

    pub fn replace_loaded(&self, values: ValueMap) {
        *self.loaded.write() = Arc::new(values);
    }

    /// Folds a persisted delta into the loaded data.
    pub fn apply_delta(&self, delta: &ValueMap) {
        let mut loaded = self.loaded.write();
        let values = Arc::make_mut(&mut loaded);
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
    }

    pub fn pending(&self) -> MutexGuard<'_, PendingOverlay> {
        self.pending.lock()
    }

    /// This descriptor's contribution for `key`.
    ///
    /// `Some(None)` means the key is hidden by a pending removal; lookups stop there.
    fn contribution(&self, key: &str) -> Option<Option<Option<String>>> {
        if let Some(entry) = self.pending.lock().get(key) {
            return Some(entry.visible());
        }
        self.loaded.read().get(key).map(|value| Some(value.clone()))
    }
}

/// Winning value for a key and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    /// Value as stored, `None` if the key is present without a value.
    pub value: Option<String>,
    /// Name of the source that supplied it.
    pub source: String,
    /// Level of that source.
    pub level: i32,
}

/// Public description of a registered source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Source name.
    pub name: String,
    /// Registration options.
    pub options: SourceOptions,
    /// Number of pending edits.
    pub pending: usize,
}

/// Level-ordered set of descriptors.
///
/// Descriptors are kept sorted ascending by `(level, registration order)`, so
/// iterating in reverse visits them in override order.
pub(crate) struct SourceRegistry {
    descriptors: Vec<Arc<Descriptor>>,
}

impl SourceRegistry {
    pub fn new(mut descriptors: Vec<Arc<Descriptor>>) -> Self {
        descriptors.sort_by_key(|d| (d.options.level, d.id));
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[Arc<Descriptor>] {
        &self.descriptors
    }

    /// Highest-priority descriptor defining `key`, honouring pending edits.
    pub fn resolve(&self, key: &str) -> Option<ResolvedValue> {
        for descriptor in self.descriptors.iter().rev() {
            match descriptor.contribution(key) {
                Some(Some(value)) => {
                    return Some(ResolvedValue {
                        value,
                        source: descriptor.name().to_string(),
                        level: descriptor.level(),
                    });
                }
                Some(None) => return None,
                None => {}
            }
        }
        None
    }

    /// Visible entry for `key`: `None` if absent, `Some(None)` if null.
    pub fn visible(&self, key: &str) -> Option<Option<String>> {
        self.resolve(key).map(|resolved| resolved.value)
    }

    /// Full merged map across every descriptor and overlay.
    pub fn merge(&self) -> ValueMap {
        let mut merged = ValueMap::new();

        for descriptor in &self.descriptors {
            for (key, value) in descriptor.loaded().iter() {
                merged.insert(key.clone(), value.clone());
            }

            let pending = descriptor.pending();
            for (key, entry) in pending.entries() {
                match entry.visible() {
                    Some(value) => {
                        merged.insert(key.to_string(), value);
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }

        merged
    }

    /// Write target for `set`/`remove`.
    ///
    /// With an explicit level, the preferred writeable descriptor at exactly
    /// that level; otherwise the preferred one at the highest level that has
    /// any writeable descriptor.
    pub fn write_target(&self, level: Option<i32>) -> Result<Arc<Descriptor>> {
        let level = match level {
            Some(level) => level,
            None => self
                .descriptors
                .iter()
                .rev()
                .find(|d| d.options.writeable)
                .map(|d| d.level())
                .ok_or(ConfigError::NoWritableSource { level: None })?,
        };

        let writeable: Vec<&Arc<Descriptor>> = self
            .descriptors
            .iter()
            .filter(|d| d.level() == level && d.options.writeable)
            .collect();

        writeable
            .iter()
            .rev()
            .find(|d| d.options.primary_writer)
            .or_else(|| writeable.last())
            .map(|d| Arc::clone(d))
            .ok_or(ConfigError::NoWritableSource { level: Some(level) })
    }

    /// Descriptors a save at `level` persists; empty for an unknown level.
    pub fn save_targets(&self, level: Option<i32>) -> Vec<Arc<Descriptor>> {
        match level {
            Some(level) => self.write_target(Some(level)).into_iter().collect(),
            None => self
                .descriptors
                .iter()
                .filter(|d| d.options.writeable)
                .cloned()
                .collect(),
        }
    }

    /// Descriptor that wins reads at `level`.
    pub fn at_level(&self, level: i32) -> Option<&Arc<Descriptor>> {
        self.descriptors.iter().rev().find(|d| d.level() == level)
    }

    pub fn infos(&self) -> Vec<SourceInfo> {
        self.descriptors
            .iter()
            .map(|d| SourceInfo {
                name: d.name().to_string(),
                options: d.options.clone(),
                pending: d.pending().len(),
            })
            .collect()
    }
}
