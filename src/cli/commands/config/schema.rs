use async_trait::async_trait;

use crate::{
    cli::{CliError, Command, CommandResult, types::CommandMetadata},
    settings::EngineSettings,
};

/// Prints the JSON schema of the engine settings file.
pub struct SchemaCommand;

#[async_trait]
impl Command for SchemaCommand {
    async fn execute(&self, _args: &[String]) -> CommandResult {
        serde_json::to_string_pretty(&EngineSettings::schema())
            .map_err(|e| CliError::Io(e.into()))
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            name: "schema".to_string(),
            description: "Print the JSON schema of the --settings file".to_string(),
            category: "config".to_string(),
            args: Vec::new(),
            examples: vec!["confstack config schema > settings.schema.json".to_string()],
        }
    }
}
