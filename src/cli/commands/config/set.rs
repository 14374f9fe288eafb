use async_trait::async_trait;

use crate::{
    cli::{
        Command, CommandResult,
        types::{ArgType, CommandArg, CommandMetadata, parse_level, required_arg},
    },
    config_store::ConfigStore,
};

/// Writes a value and persists it.
///
/// Without a level the highest writeable source receives the value.
pub struct SetCommand {
    config_store: ConfigStore,
}

impl SetCommand {
    /// Creates a new SetCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }
}

#[async_trait]
impl Command for SetCommand {
    /// # Errors
    ///
    /// * `CliError::InvalidArguments` - If the level is not an integer
    /// * `CliError::Config` - If no source is writeable or the save fails
    async fn execute(&self, args: &[String]) -> CommandResult {
        let key = required_arg(args, 0, "key")?;
        let value = required_arg(args, 1, "value")?;
        let level = args.get(2).map(|raw| parse_level(raw)).transpose()?;

        match level {
            Some(level) => self.config_store.set_at(level, key, value)?,
            None => self.config_store.set(key, value)?,
        }
        self.config_store.save(level).await?;

        let shown = self.config_store.mask(key, Some(value));
        Ok(format!("Set '{key}' to '{shown}'"))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "set".to_string(),
            description: "Set and persist a configuration value".to_string(),
            category: "config".to_string(),
            args: vec![
                CommandArg {
                    name: "key".to_string(),
                    description: "Configuration key".to_string(),
                    required: true,
                    value_type: ArgType::Key,
                },
                CommandArg {
                    name: "value".to_string(),
                    description: "New value".to_string(),
                    required: true,
                    value_type: ArgType::String,
                },
                CommandArg {
                    name: "level".to_string(),
                    description: "Level of the source to write to".to_string(),
                    required: false,
                    value_type: ArgType::Number,
                },
            ],
            examples: vec![
                "confstack config set Database:Port 5433".to_string(),
                "confstack config set Logging:Level debug 10".to_string(),
            ],
        }
    }
}
