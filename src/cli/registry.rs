use std::collections::HashMap;

use crate::config_store::ConfigStore;

use super::{
    CliError, Command,
    commands::config::{self},
    formatting::{format_category, format_command, format_description, format_header, format_usage},
    types::CommandMetadata,
};

/// Registry for CLI commands organized by category.
///
/// ```text
/// registry
/// └── config
///     ├── dump
///     ├── get
///     ├── remove
///     ├── resolve
///     ├── schema
///     ├── set
///     ├── sources
///     └── watch
/// ```
pub struct CommandRegistry {
    /// category name -> (command name -> command implementation)
    categories: HashMap<String, HashMap<String, Box<dyn Command>>>,
    config_store: ConfigStore,
}

impl CommandRegistry {
    /// Creates an empty registry; see [`CommandRegistry::register_all_commands`].
    pub fn new(config_store: ConfigStore) -> Self {
        Self {
            categories: HashMap::new(),
            config_store,
        }
    }

    /// Registers a command in the specified category, replacing any command
    /// of the same name.
    pub fn register_command(&mut self, category: &str, command: Box<dyn Command>) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(command.metadata().name, command);
    }

    /// Executes a command by category and name with the provided arguments.
    ///
    /// # Errors
    ///
    /// * `CliError::CommandNotFound` - If the category or command is unknown
    /// * `CliError::InvalidArguments` - If the argument count does not fit the command
    /// * any error returned by the command itself
    pub async fn execute(
        &self,
        category: &str,
        command_name: &str,
        args: &[String],
    ) -> Result<String, CliError> {
        let found_category = self.categories.get(category).ok_or_else(|| {
            CliError::CommandNotFound(format!("Failed to find category '{category}'"))
        })?;

        let found_command = found_category.get(command_name).ok_or_else(|| {
            CliError::CommandNotFound(format!("Failed to find command '{command_name}'"))
        })?;

        Self::validate_args(&found_command.metadata(), args)?;

        found_command.execute(args).await
    }

    /// Lists all registered commands by category, both sorted alphabetically.
    pub fn list_commands(&self) -> Vec<(String, Vec<String>)> {
        let mut categories: Vec<(String, Vec<String>)> = self
            .categories
            .iter()
            .map(|(category, commands)| {
                let mut command_list: Vec<String> = commands.keys().cloned().collect();
                command_list.sort();

                (category.clone(), command_list)
            })
            .collect();

        categories.sort();

        categories
    }

    /// Renders help text for every registered command.
    pub fn help(&self) -> String {
        let mut out = format_header("Usage: confstack [OPTIONS] <category> <command> [args...]");
        out.push('\n');

        for (category, names) in self.list_commands() {
            out.push('\n');
            out.push_str(&format_category(&category));
            out.push('\n');

            let Some(commands) = self.categories.get(&category) else {
                continue;
            };
            for name in names {
                let Some(command) = commands.get(&name) else {
                    continue;
                };
                let metadata = command.metadata();
                let usage = metadata
                    .args
                    .iter()
                    .map(|arg| {
                        if arg.required {
                            format!("<{}>", arg.name)
                        } else {
                            format!("[{}]", arg.name)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");

                out.push_str(&format!(
                    "  {} {}  {}\n",
                    format_command(&metadata.name),
                    usage,
                    format_description(&metadata.description)
                ));
                for example in &metadata.examples {
                    out.push_str(&format!("      {}\n", format_usage(example)));
                }
            }
        }

        out
    }

    fn validate_args(metadata: &CommandMetadata, args: &[String]) -> Result<(), CliError> {
        let required_count = metadata.args.iter().filter(|arg| arg.required).count();
        let total_count = metadata.args.len();

        if args.len() < required_count {
            return Err(CliError::InvalidArguments(format!(
                "Expected at least {} arguments, got {}",
                required_count,
                args.len(),
            )));
        }

        if args.len() > total_count {
            return Err(CliError::InvalidArguments(format!(
                "Expected at most {} arguments, got {}",
                total_count,
                args.len(),
            )));
        }

        Ok(())
    }

    /// Registers every built-in command.
    pub fn register_all_commands(&mut self) {
        let store = self.config_store.clone();
        config::register_commands(self, store);
    }
}
