//! confstack - inspect and edit layered configuration from the command line.
//!
//! Sources are assembled from flags: every `--file` becomes a writeable,
//! optional, hot-reloaded TOML source, and `--env-prefix` adds a read-only
//! environment layer above them.

use std::{env, error::Error, path::PathBuf, process};

use clap::Parser;
use confstack::{
    cli::{CliService, FileArg, formatting::format_error},
    config_store::ConfigStore,
    settings::EngineSettings,
    source::{EnvironmentSource, SourceOptions, TomlFileSource},
    tracing_config::{self, LogFormat},
    transform::AesGcmCipher,
};
use tracing::{Level, debug, span};

/// Environment variable holding the passphrase for value encryption.
const CIPHER_KEY_ENV: &str = "CONFSTACK_CIPHER_KEY";

#[derive(Parser)]
#[command(name = "confstack")]
#[command(about = "Inspect and edit layered configuration")]
struct Cli {
    /// TOML file to layer, optionally suffixed with `@level`. Repeatable;
    /// later files default to higher levels.
    #[arg(short, long = "file", value_name = "PATH[@LEVEL]")]
    files: Vec<FileArg>,

    /// Expose environment variables with this prefix as a read-only layer.
    #[arg(long)]
    env_prefix: Option<String>,

    /// Level of the environment layer.
    #[arg(long, default_value_t = 1000, allow_hyphen_values = true)]
    env_level: i32,

    /// Engine settings file (TOML).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log output format: pretty or json. Overrides CONFSTACK_LOG_FORMAT.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// `<category> <command> [args...]`; omit for help.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_config::init_cli_mode(cli.log_format.unwrap_or_else(LogFormat::from_env))?;
    let _span = span!(Level::DEBUG, "confstack").entered();

    let store = build_store(&cli).await?;
    let service = CliService::new(store.clone());

    let (category, command, args) = match cli.command.as_slice() {
        [] => {
            println!("{}", service.help());
            return Ok(());
        }
        [category] if category == "help" => {
            println!("{}", service.help());
            return Ok(());
        }
        [category] => (category.as_str(), "", &[][..]),
        [category, command, args @ ..] => (category.as_str(), command.as_str(), args),
    };

    let result = service.execute_command(category, command, args).await;
    store.shutdown().await;

    match result {
        Ok(output) => {
            if !output.trim().is_empty() {
                println!("{output}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string()));
            process::exit(1);
        }
    }
}

async fn build_store(cli: &Cli) -> Result<ConfigStore, Box<dyn Error>> {
    let settings = match &cli.settings {
        Some(path) => EngineSettings::from_file(path)?,
        None => EngineSettings::default(),
    };

    let mut builder = ConfigStore::builder().settings(settings);

    for (index, file) in cli.files.iter().enumerate() {
        let level = file.level_or_position(index);
        debug!(file = %file, level, "Adding file source");
        builder = builder.add_source(
            TomlFileSource::new(&file.path),
            SourceOptions::at_level(level)
                .writeable()
                .optional()
                .reload_on_change(),
        );
    }

    if let Some(prefix) = &cli.env_prefix {
        builder = builder.add_source(
            EnvironmentSource::with_prefix(prefix.clone()),
            SourceOptions::at_level(cli.env_level),
        );
    }

    if let Ok(passphrase) = env::var(CIPHER_KEY_ENV) {
        builder = builder.cipher(AesGcmCipher::from_passphrase(&passphrase));
    }

    Ok(builder.build().await?)
}
