use async_trait::async_trait;

use crate::{
    cli::{Command, CommandResult, types::CommandMetadata},
    config_store::ConfigStore,
};

/// Lists registered sources from highest to lowest level.
pub struct SourcesCommand {
    config_store: ConfigStore,
}

impl SourcesCommand {
    /// Creates a new SourcesCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }
}

#[async_trait]
impl Command for SourcesCommand {
    async fn execute(&self, _args: &[String]) -> CommandResult {
        let lines: Vec<String> = self
            .config_store
            .sources()
            .into_iter()
            .rev()
            .map(|info| {
                let mut flags = Vec::new();
                if info.options.primary_writer {
                    flags.push("primary");
                } else if info.options.writeable {
                    flags.push("writeable");
                }
                if info.options.optional {
                    flags.push("optional");
                }
                if info.options.reload_on_change {
                    flags.push("reload");
                }

                format!(
                    "{:>6}  {}  [{}] pending={}",
                    info.options.level,
                    info.name,
                    flags.join(", "),
                    info.pending
                )
            })
            .collect();

        Ok(lines.join("\n"))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "sources".to_string(),
            description: "List registered sources in override order".to_string(),
            category: "config".to_string(),
            args: Vec::new(),
            examples: vec!["confstack -f base.toml -f user.toml@10 config sources".to_string()],
        }
    }
}
