use async_trait::async_trait;

use crate::{
    cli::{
        Command, CommandResult,
        formatting::format_value,
        types::{ArgType, CommandArg, CommandMetadata, required_arg},
    },
    config_store::ConfigStore,
};

/// Prints the merged, decrypted value of a key.
///
/// ```bash
/// confstack -f app.toml config get Database:Host
/// ```
pub struct GetCommand {
    config_store: ConfigStore,
}

impl GetCommand {
    /// Creates a new GetCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }
}

#[async_trait]
impl Command for GetCommand {
    /// # Errors
    ///
    /// * `CliError::Config` - If the stored value cannot be decrypted
    async fn execute(&self, args: &[String]) -> CommandResult {
        let key = required_arg(args, 0, "key")?;

        if !self.config_store.exists(key) {
            return Ok(format!("{key}: <not set>"));
        }

        let value = self.config_store.get(key)?;
        let source = self
            .config_store
            .resolve(key)
            .map(|resolved| format!(" (from {} @ {})", resolved.source, resolved.level))
            .unwrap_or_default();

        Ok(format!("{key}: {}{source}", format_value(value.as_deref())))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "get".to_string(),
            description: "Get a configuration value".to_string(),
            category: "config".to_string(),
            args: vec![CommandArg {
                name: "key".to_string(),
                description: "Configuration key (e.g., Database:Host)".to_string(),
                required: true,
                value_type: ArgType::Key,
            }],
            examples: vec![
                "confstack config get Database:Host".to_string(),
                "confstack config get Logging:Level".to_string(),
            ],
        }
    }
}
