//! examgeo CLI - exam session geocoding
//!
//! A command-line interface for managing exam session addresses and
//! geocoding them in resumable batches under the monthly provider quota.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "examgeo")]
#[command(author, version, about = "Exam session geocoding CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log info-level messages (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Override database path (or set EXAMGEO_DB_PATH env var)
    #[arg(long, env = "EXAMGEO_DB_PATH", global = true)]
    db: Option<String>,

    /// Override progress file path (or set EXAMGEO_PROGRESS_PATH env var)
    #[arg(long, env = "EXAMGEO_PROGRESS_PATH", global = true)]
    progress_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage exam sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },

    /// Geocode session addresses
    Geocode {
        #[command(subcommand)]
        action: commands::geocode::GeocodeAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // Set up paths if provided
    if let Some(db_path) = &cli.db {
        std::env::set_var(examgeo_core::db::DB_PATH_ENV, db_path);
    }
    if let Some(progress_path) = &cli.progress_file {
        std::env::set_var(
            examgeo_core::services::geocoding::config::PROGRESS_PATH_ENV,
            progress_path,
        );
    }

    // Initialize database
    let db = examgeo_core::Database::new().await?;
    log::debug!("[cli] examgeo {} ready", examgeo_core::version());

    // Create context for commands
    let ctx = commands::Context {
        db,
        config: examgeo_core::GeocodeConfig::from_env(),
        format: cli.format,
        quiet: cli.quiet,
    };

    // Execute command
    match cli.command {
        Commands::Session { action } => commands::session::execute(&ctx, action).await,
        Commands::Geocode { action } => commands::geocode::execute(&ctx, action).await,
        Commands::Config { action } => commands::config::execute(&ctx, action).await,
    }
}
