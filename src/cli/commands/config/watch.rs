use async_trait::async_trait;

use crate::{
    cli::{
        Command, CommandResult,
        formatting::{format_batch, format_error},
        types::{ArgType, CommandArg, CommandMetadata},
    },
    config_store::{ChangeBatch, ChangeEvent, ConfigStore},
};

/// Streams change batches until Ctrl+C or the store closes.
pub struct WatchCommand {
    config_store: ConfigStore,
}

impl WatchCommand {
    /// Creates a new WatchCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }
}

/// Narrows `batch` to keys under `prefix`; `None` if nothing is left.
pub(crate) fn filter_batch(batch: &ChangeBatch, prefix: Option<&str>) -> Option<ChangeBatch> {
    let Some(prefix) = prefix else {
        return Some(batch.clone());
    };

    let changes = batch
        .changes
        .iter()
        .filter(|(key, _)| key.starts_with(prefix))
        .map(|(key, change)| (key.clone(), change.clone()))
        .collect();

    ChangeBatch::new(changes).map(|mut filtered| {
        filtered.batch_id = batch.batch_id;
        filtered.timestamp = batch.timestamp;
        filtered
    })
}

#[async_trait]
impl Command for WatchCommand {
    async fn execute(&self, args: &[String]) -> CommandResult {
        let prefix = args.first().map(String::as_str);

        println!(
            "Watching changes{}...",
            prefix.map(|p| format!(" under '{p}'")).unwrap_or_default()
        );
        println!("Press Ctrl+C to stop");

        let mut subscription = self.config_store.subscribe();
        let mut batches = 0usize;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = subscription.recv() => match event {
                    Some(ChangeEvent::Batch(batch)) => {
                        if let Some(batch) = filter_batch(&batch, prefix) {
                            batches += 1;
                            println!("{}", format_batch(&batch));
                        }
                    }
                    Some(ChangeEvent::Error(record)) => {
                        eprintln!(
                            "{}",
                            format_error(&format!(
                                "reload failed (rolled back: {}): {}",
                                record.rolled_back, record.error
                            ))
                        );
                    }
                    Some(ChangeEvent::Completed) | None => break,
                },
            }
        }

        Ok(format!("Watch ended after {batches} batches"))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "watch".to_string(),
            description: "Print change batches as sources change".to_string(),
            category: "config".to_string(),
            args: vec![CommandArg {
                name: "prefix".to_string(),
                description: "Only show keys starting with this prefix".to_string(),
                required: false,
                value_type: ArgType::Key,
            }],
            examples: vec![
                "confstack -f app.toml config watch".to_string(),
                "confstack -f app.toml config watch Database:".to_string(),
            ],
        }
    }
}
