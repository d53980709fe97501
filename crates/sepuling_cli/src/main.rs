//! Command-line entry point over `sepuling_core`.
//!
//! # Responsibility
//! - Pick the storage backend from config/env/flags, then run one use-case.
//! - Print results as `key=value` lines for scripting.

use clap::{Parser, Subcommand};
use sepuling_core::{
    default_log_level, init_logging, open_repository, ConfigError, RegistrationRequest,
    RegistrationResponse, SepulkaId, SepulkaService, StorageBackend, StorageConfig,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "sepuling", version, about = "Register and inspect sepulkas")]
struct Cli {
    /// TOML storage configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured backend.
    #[arg(long, value_parser = parse_backend)]
    backend: Option<StorageBackend>,
    /// Overrides the configured database path (`:memory:` for a scratch run).
    #[arg(long)]
    database: Option<String>,
    /// Absolute directory for rolling log files; stderr when omitted.
    #[arg(long)]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Health probe that does not touch storage.
    Ping,
    /// Registers a new sepulka under an external id.
    Register { external_id: String },
    /// Resolves an external id to its internal id.
    Exists { external_id: String },
    /// Shows the preview of one sepulka.
    Preview { internal_id: SepulkaId },
    /// Advances a sepulka past the revision the caller observed.
    Touch {
        internal_id: SepulkaId,
        revision: i64,
    },
}

fn parse_backend(value: &str) -> Result<StorageBackend, String> {
    value.parse().map_err(|err| format!("{err}"))
}

/// Merges storage settings; flags beat environment, environment beats file.
fn storage_config(
    cli: &Cli,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<StorageConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)?,
        None => StorageConfig::default(),
    }
    .with_env_overrides(lookup)?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Command::Ping = cli.command {
        println!("sepuling_core ping={}", sepuling_core::ping());
        println!("sepuling_core version={}", sepuling_core::core_version());
        return Ok(());
    }

    let config = storage_config(&cli, |key| std::env::var(key).ok())?;
    let level = config.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, cli.log_dir.as_deref())?;

    let service = SepulkaService::new(open_repository(&config)?);
    match cli.command {
        Command::Ping => {}
        Command::Register { external_id } => {
            let saved = service.register(&RegistrationRequest::new(external_id))?;
            let response = RegistrationResponse::from(&saved);
            println!("external_id={}", response.external_id);
            println!("internal_id={}", response.internal_id);
            println!("revision={}", response.revision);
            println!("created_at={}", response.created_at);
        }
        Command::Exists { external_id } => match service.exists(&external_id)? {
            Some(existence) => {
                println!("found=true");
                println!("internal_id={}", existence.internal_id);
            }
            None => println!("found=false"),
        },
        Command::Preview { internal_id } => match service.preview(internal_id)? {
            Some(preview) => {
                println!("found=true");
                println!("external_id={}", preview.external_id);
                println!("created_at={}", preview.created_at);
            }
            None => println!("found=false"),
        },
        Command::Touch {
            internal_id,
            revision,
        } => {
            let applied = service.touch(internal_id, revision)?;
            println!("revision={}", applied.revision);
            println!("updated_at={}", applied.updated_at);
        }
    }
    Ok(())
}
