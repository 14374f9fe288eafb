use async_trait::async_trait;

use crate::{
    cli::{
        Command, CommandResult,
        types::{ArgType, CommandArg, CommandMetadata, parse_level, required_arg},
    },
    config_store::ConfigStore,
};

/// Removes a key and persists the removal.
pub struct RemoveCommand {
    config_store: ConfigStore,
}

impl RemoveCommand {
    /// Creates a new RemoveCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }
}

#[async_trait]
impl Command for RemoveCommand {
    async fn execute(&self, args: &[String]) -> CommandResult {
        let key = required_arg(args, 0, "key")?;
        let level = args.get(1).map(|raw| parse_level(raw)).transpose()?;

        match level {
            Some(level) => self.config_store.remove_at(level, key)?,
            None => self.config_store.remove(key)?,
        }
        self.config_store.save(level).await?;

        Ok(format!("Removed '{key}'"))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "remove".to_string(),
            description: "Remove a configuration key and persist the removal".to_string(),
            category: "config".to_string(),
            args: vec![
                CommandArg {
                    name: "key".to_string(),
                    description: "Configuration key".to_string(),
                    required: true,
                    value_type: ArgType::Key,
                },
                CommandArg {
                    name: "level".to_string(),
                    description: "Level of the source to remove from".to_string(),
                    required: false,
                    value_type: ArgType::Number,
                },
            ],
            examples: vec!["confstack config remove Cache:Enabled".to_string()],
        }
    }
}
