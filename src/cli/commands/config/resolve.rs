use async_trait::async_trait;

use crate::{
    cli::{
        Command, CommandResult,
        formatting::format_value,
        types::{ArgType, CommandArg, CommandMetadata, required_arg},
    },
    config_store::ConfigStore,
};

/// Expands `${...}` references.
///
/// An argument containing the template prefix is expanded as text; anything
/// else is read as a key whose value is expanded.
pub struct ResolveCommand {
    config_store: ConfigStore,
}

impl ResolveCommand {
    /// Creates a new ResolveCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }
}

#[async_trait]
impl Command for ResolveCommand {
    async fn execute(&self, args: &[String]) -> CommandResult {
        let input = required_arg(args, 0, "key|text")?;

        if input.contains(self.config_store.settings().template.prefix.as_str()) {
            return Ok(self.config_store.resolve_template(input)?);
        }

        let value = self.config_store.get_resolved(input)?;
        Ok(format!("{input}: {}", format_value(value.as_deref())))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "resolve".to_string(),
            description: "Expand references in a key's value or in literal text".to_string(),
            category: "config".to_string(),
            args: vec![CommandArg {
                name: "key|text".to_string(),
                description: "Configuration key, or text containing ${...} references".to_string(),
                required: true,
                value_type: ArgType::Key,
            }],
            examples: vec![
                "confstack config resolve Database:ConnectionString".to_string(),
                "confstack config resolve 'http://${Server:Host}:${Server:Port}'".to_string(),
            ],
        }
    }
}
