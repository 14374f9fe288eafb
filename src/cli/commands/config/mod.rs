//! Configuration management commands.
mod dump;
mod get;
mod remove;
mod resolve;
mod schema;
mod set;
mod sources;
pub(crate) mod watch;

pub use dump::DumpCommand;
pub use get::GetCommand;
pub use remove::RemoveCommand;
pub use resolve::ResolveCommand;
pub use schema::SchemaCommand;
pub use set::SetCommand;
pub use sources::SourcesCommand;
pub use watch::WatchCommand;

use crate::{cli::CommandRegistry, config_store::ConfigStore};

/// Registers every command of the "config" category.
pub fn register_commands(registry: &mut CommandRegistry, config_store: ConfigStore) {
    const CATEGORY_NAME: &str = "config";

    registry.register_command(CATEGORY_NAME, Box::new(GetCommand::new(config_store.clone())));
    registry.register_command(CATEGORY_NAME, Box::new(ResolveCommand::new(config_store.clone())));
    registry.register_command(CATEGORY_NAME, Box::new(SetCommand::new(config_store.clone())));
    registry.register_command(CATEGORY_NAME, Box::new(RemoveCommand::new(config_store.clone())));
    registry.register_command(CATEGORY_NAME, Box::new(DumpCommand::new(config_store.clone())));
    registry.register_command(CATEGORY_NAME, Box::new(SourcesCommand::new(config_store.clone())));
    registry.register_command(CATEGORY_NAME, Box::new(SchemaCommand));
    registry.register_command(CATEGORY_NAME, Box::new(WatchCommand::new(config_store)));
}
