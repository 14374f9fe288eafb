use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::{
    file_watching::spawn_reload_loop,
    registry::{Descriptor, SourceRegistry},
    store::{ConfigStore, StoreInner},
};
use crate::{
    core::{ConfigError, Result},
    settings::{EngineSettings, ReloadStrategy, TemplateOptions},
    source::{ConfigSource, ReloadSignal, SourceOptions, ValueMap},
    template::TemplateResolver,
    transform::{CipherProvider, TransformPipeline},
};

/// Assembles a [`ConfigStore`] from sources and engine settings.
///
/// ```no_run
/// # async fn demo() -> confstack::Result<()> {
/// use confstack::{
///     config_store::ConfigStore,
///     source::{EnvironmentSource, SourceOptions, TomlFileSource},
/// };
///
/// let store = ConfigStore::builder()
///     .add_source(TomlFileSource::new("app.toml"), SourceOptions::at_level(0))
///     .add_source(
///         TomlFileSource::new("local.toml"),
///         SourceOptions::at_level(1).writeable().optional().reload_on_change(),
///     )
///     .add_source(EnvironmentSource::with_prefix("APP_"), SourceOptions::at_level(2))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ConfigStoreBuilder {
    settings: EngineSettings,
    sources: Vec<(Arc<dyn ConfigSource>, SourceOptions)>,
    cipher: Option<Arc<dyn CipherProvider>>,
}

impl ConfigStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all engine settings.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Registers a source. Later registrations override earlier ones at the same level.
    pub fn add_source<S: ConfigSource + 'static>(self, source: S, options: SourceOptions) -> Self {
        self.add_shared_source(Arc::new(source), options)
    }

    /// Registers a source the caller keeps a handle to.
    pub fn add_shared_source(mut self, source: Arc<dyn ConfigSource>, options: SourceOptions) -> Self {
        self.sources.push((source, options));
        self
    }

    pub fn reload_strategy(mut self, strategy: ReloadStrategy) -> Self {
        self.settings.reload.strategy = strategy;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.settings.reload.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn rollback_on_error(mut self, rollback: bool) -> Self {
        self.settings.reload.rollback_on_error = rollback;
        self
    }

    pub fn history_size(mut self, size: usize) -> Self {
        self.settings.reload.history_size = size;
        self
    }

    /// Restricts published changes to keys starting with one of `prefixes`.
    pub fn key_prefix_filters<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.reload.key_prefix_filters = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Enables transparent encryption of sensitive keys.
    pub fn cipher<C: CipherProvider + 'static>(mut self, cipher: C) -> Self {
        self.cipher = Some(Arc::new(cipher));
        self
    }

    pub fn template_options(mut self, options: TemplateOptions) -> Self {
        self.settings.template = options;
        self
    }

    /// Loads every source and starts the reload pipeline.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// * `ConfigError::SourceLoad` - If a required source is missing or invalid
    /// * `ConfigError::InvalidPattern` - If a configured key pattern is invalid
    /// * `ConfigError::FileWatch` - If a source watch cannot be established
    #[instrument(skip(self), fields(sources = self.sources.len(), strategy = %self.settings.reload.strategy))]
    pub async fn build(self) -> Result<ConfigStore> {
        let transform = TransformPipeline::new(&self.settings, self.cipher)?;
        let templates = TemplateResolver::new(self.settings.template.clone());

        let mut descriptors = Vec::with_capacity(self.sources.len());
        for (id, (source, options)) in self.sources.into_iter().enumerate() {
            let values = load_initial(source.as_ref(), &options).await?;
            debug!(
                source = source.name(),
                level = options.level,
                keys = values.len(),
                "Registered source"
            );
            descriptors.push(Arc::new(Descriptor::new(id, options, source, values)));
        }

        let registry = SourceRegistry::new(descriptors);
        let inner = Arc::new(StoreInner::new(self.settings, registry, transform, templates));

        if inner.settings.reload.strategy != ReloadStrategy::Manual {
            start_watching(&inner)?;
        }

        info!(
            sources = inner.registry.descriptors().len(),
            keys = inner.current().len(),
            "Configuration store built"
        );
        Ok(ConfigStore::from_inner(inner))
    }
}

async fn load_initial(source: &dyn ConfigSource, options: &SourceOptions) -> Result<ValueMap> {
    match source.load().await {
        Ok(values) => Ok(values),
        Err(e) if options.optional => {
            warn!(source = source.name(), error = %e, "Optional source unavailable, using empty snapshot");
            Ok(ValueMap::new())
        }
        Err(e) => Err(ConfigError::SourceLoad {
            name: source.name().to_string(),
            details: e.to_string(),
        }),
    }
}

fn start_watching(inner: &Arc<StoreInner>) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watched = 0;

    for descriptor in inner.registry.descriptors() {
        if !descriptor.options.reload_on_change || !descriptor.source.supports_reload() {
            continue;
        }

        if let Some(guard) = descriptor
            .source
            .watch(ReloadSignal::new(descriptor.id, tx.clone()))?
        {
            inner.watch_guards.lock().push(guard);
        }
        watched += 1;
    }

    if watched == 0 {
        return Ok(());
    }

    let task = spawn_reload_loop(
        Arc::downgrade(inner),
        rx,
        inner.settings.reload.debounce(),
        inner.shutdown.clone(),
    );
    *inner.reload_task.lock() = Some(task);

    debug!(watched, "Reload pipeline started");
    Ok(())
}
