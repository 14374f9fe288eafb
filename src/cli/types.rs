use async_trait::async_trait;
use thiserror::Error;

use crate::core::ConfigError;

/// Errors that can occur during CLI command execution.
#[derive(Error, Debug)]
pub enum CliError {
    /// A command or category was not found in the registry.
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Invalid arguments were provided to a command.
    ///
    /// Returned when argument validation fails, such as missing required
    /// arguments, too many arguments, or values that do not parse.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The configuration store rejected the operation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for command execution results.
///
/// Commands return their output as a String, or a CliError describing what
/// went wrong.
pub type CommandResult = Result<String, CliError>;

/// Metadata for a single command argument.
#[derive(Debug, Clone)]
pub struct CommandArg {
    /// The name of the argument (e.g., "key", "value", "level").
    pub name: String,

    /// Human-readable description of what this argument does.
    pub description: String,

    /// Whether this argument is required for command execution.
    pub required: bool,

    /// The expected type of this argument for help display.
    pub value_type: ArgType,
}

/// Type classification for command arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// A general string value.
    String,

    /// An integer value.
    Number,

    /// A `:`-separated configuration key.
    Key,
}

/// Complete metadata for a CLI command.
///
/// Drives help generation and argument count validation.
#[derive(Debug, Clone)]
pub struct CommandMetadata {
    /// The command name (e.g., "get", "set", "watch").
    pub name: String,

    /// Brief description of what this command does.
    pub description: String,

    /// Every argument this command accepts.
    pub args: Vec<CommandArg>,

    /// Example usage strings to show in help text.
    pub examples: Vec<String>,

    /// Category this command belongs to (e.g., "config").
    pub category: String,
}

/// Interface implemented by every CLI command.
///
/// Commands receive the store through their constructors.
#[async_trait]
pub trait Command: Send + Sync {
    /// Executes the command with the provided arguments.
    ///
    /// The registry has already checked the argument count against
    /// [`Command::metadata`].
    ///
    /// # Errors
    ///
    /// Returns `CliError` for invalid argument values or store failures.
    async fn execute(&self, args: &[String]) -> CommandResult;

    /// Returns the complete metadata for this command.
    fn metadata(&self) -> CommandMetadata;
}

pub(crate) fn parse_level(raw: &str) -> Result<i32, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidArguments(format!("'{raw}' is not a valid level")))
}

pub(crate) fn required_arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str, CliError> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| CliError::InvalidArguments(format!("Expected <{name}> argument")))
}
