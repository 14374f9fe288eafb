use async_trait::async_trait;

use crate::{
    cli::{
        CliError, Command, CommandResult,
        formatting::format_value,
        types::{ArgType, CommandArg, CommandMetadata},
    },
    config_store::ConfigStore,
};

/// Prints every merged key, sensitive values masked unless `raw` is given.
pub struct DumpCommand {
    config_store: ConfigStore,
}

impl DumpCommand {
    /// Creates a new DumpCommand over `config_store`.
    pub fn new(config_store: ConfigStore) -> Self {
        Self { config_store }
    }

    fn raw(&self) -> CommandResult {
        let snapshot = self.config_store.snapshot();
        let lines: Vec<String> = snapshot
            .sorted()
            .into_iter()
            .map(|(key, _)| -> Result<String, CliError> {
                let value = self.config_store.get(key)?;
                Ok(format!("{key} = {}", format_value(value.as_deref())))
            })
            .collect::<Result<_, _>>()?;

        Ok(lines.join("\n"))
    }

    fn masked(&self) -> CommandResult {
        let lines: Vec<String> = self
            .config_store
            .export_masked()?
            .into_iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect();

        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl Command for DumpCommand {
    async fn execute(&self, args: &[String]) -> CommandResult {
        match args.first().map(String::as_str) {
            None | Some("masked") => self.masked(),
            Some("raw") => self.raw(),
            Some(other) => Err(CliError::InvalidArguments(format!(
                "unknown dump mode '{other}', expected 'masked' or 'raw'"
            ))),
        }
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "dump".to_string(),
            description: "Print every configuration key".to_string(),
            category: "config".to_string(),
            args: vec![CommandArg {
                name: "mode".to_string(),
                description: "'masked' (default) or 'raw'".to_string(),
                required: false,
                value_type: ArgType::String,
            }],
            examples: vec![
                "confstack config dump".to_string(),
                "confstack config dump raw".to_string(),
            ],
        }
    }
}
