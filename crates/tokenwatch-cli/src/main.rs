mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::Format;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokenwatch_core::{http_client, AppConfig, Database};

#[derive(Parser)]
#[command(name = "tokenwatch", version, about = "Track token usage of AI provider APIs")]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table, global = true)]
    format: Format,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List captured usage records, newest first
    #[command(alias = "ls")]
    Records {
        /// Only this provider (openai, anthropic, google, xai, deepseek)
        #[arg(long)]
        provider: Option<String>,
        /// Earliest capture time, epoch millis
        #[arg(long)]
        since: Option<i64>,
        /// Latest capture time, epoch millis
        #[arg(long)]
        until: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Totals across all records
    Summary {
        #[arg(long)]
        since: Option<i64>,
        #[arg(long)]
        until: Option<i64>,
    },
    /// Usage per provider
    Providers,
    /// Usage per model
    Models,
    /// Usage per day (UTC)
    Daily,
    /// Delete all usage records
    Clear {
        #[arg(long)]
        force: bool,
    },
    /// Show provider health, optionally probing first
    Health {
        #[arg(long)]
        check: bool,
    },
    /// Show the model price table
    Costs,
    /// Export records as JSON with a SHA-256 manifest beside it
    Export { path: PathBuf },
    /// Verify an export against its manifest
    Verify { path: PathBuf },
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
    /// GET each URL through the capturing client and print recorded usage
    Watch {
        #[arg(required = true)]
        urls: Vec<String>,
        /// How long to wait for further records after the last one, in ms
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn init_db(config: &AppConfig) -> Result<Database> {
    let path = config.database_path();
    Database::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::load().context("Failed to load config")?;
    http_client::init(config.proxy_url.as_deref()).context("Failed to init HTTP client")?;
    run(cli.command, &config, cli.format)
}

fn run(cmd: Commands, config: &AppConfig, fmt: Format) -> Result<()> {
    match cmd {
        Commands::Verify { path } => {
            if !commands::verify(&path)? {
                anyhow::bail!("Hash mismatch for {}", path.display());
            }
            println!("OK {}", path.display());
            Ok(())
        }
        Commands::Config { init } => commands::config(config, init, fmt),
        other => run_with_db(other, init_db(config)?, config, fmt),
    }
}

fn run_with_db(cmd: Commands, db: Database, config: &AppConfig, fmt: Format) -> Result<()> {
    match cmd {
        Commands::Records {
            provider,
            since,
            until,
            limit,
        } => commands::records(
            &db,
            commands::RecordFilter {
                provider,
                since,
                until,
                limit,
            },
            fmt,
        ),
        Commands::Summary { since, until } => commands::summary(&db, since, until, fmt),
        Commands::Providers => commands::providers(&db, fmt),
        Commands::Models => commands::models(&db, fmt),
        Commands::Daily => commands::daily(&db, fmt),
        Commands::Clear { force } => commands::clear(&db, force),
        Commands::Health { check } => commands::health(&db, config, check, fmt),
        Commands::Costs => commands::costs(&db, fmt),
        Commands::Export { path } => {
            let sidecar = commands::export(&db, &path)?;
            println!("Exported to {} (manifest {})", path.display(), sidecar.display());
            Ok(())
        }
        Commands::Watch { urls, wait_ms } => {
            commands::watch(Arc::new(db), config, &urls, Duration::from_millis(wait_ms))
        }
        Commands::Verify { .. } | Commands::Config { .. } => Ok(()),
    }
}
