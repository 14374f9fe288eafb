//! Command-line interface for configuration management.
//!
//! Commands are organized by category and registered in a
//! [`CommandRegistry`]; help text is generated from their metadata.

mod args;
mod commands;
pub mod formatting;
mod registry;
mod service;
mod types;


pub use args::FileArg;
pub use commands::config::{
    DumpCommand, GetCommand, RemoveCommand, ResolveCommand, SchemaCommand, SetCommand,
    SourcesCommand, WatchCommand,
};
pub use registry::CommandRegistry;
pub use service::CliService;
pub use types::{ArgType, CliError, Command, CommandArg, CommandMetadata, CommandResult};
