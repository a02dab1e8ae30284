//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod cache;
mod ingest;
mod risk;
mod runs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::models::IngestionMode;
use crate::repository::{SharedStore, SqliteIngestionStore};

#[derive(Parser)]
#[command(name = "site-ingest")]
#[command(about = "Bounded, polite site ingestion crawler")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a site for a business
    Run {
        /// Business slug the run belongs to
        slug: String,
        /// Root URL of the site
        root_url: String,
        /// Crawl mode
        #[arg(short, long, value_enum, default_value = "light")]
        mode: IngestionMode,
        /// URL to fetch in user-assisted mode (repeatable)
        #[arg(short = 'u', long = "url")]
        urls: Vec<String>,
        /// Override the mode's page budget
        #[arg(long)]
        max_pages: Option<usize>,
        /// Ignore cached fetches
        #[arg(long)]
        force_refresh: bool,
        /// Print the evidence as JSON
        #[arg(long)]
        json: bool,
        /// Use an in-memory store instead of the database
        #[arg(long)]
        memory: bool,
    },

    /// List recent ingestion runs
    Runs {
        /// Only runs for this business slug
        #[arg(short, long)]
        slug: Option<String>,
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Inspect or adjust the domain risk ledger
    Risk {
        #[command(subcommand)]
        command: RiskCommands,
    },

    /// Manage the URL fetch cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum RiskCommands {
    /// Show the risk record for a hostname
    Show {
        /// Hostname (e.g. example.com)
        hostname: String,
    },
    /// List hostnames by friction count
    List {
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Set the recommended delay for a hostname (kept within the policy bounds)
    SetDelay {
        hostname: String,
        /// Delay in milliseconds
        delay_ms: u64,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove expired cache entries
    Purge,
}

async fn open_store(config: &Config) -> anyhow::Result<SharedStore> {
    let path = config.database_path();
    tracing::debug!("Opening database at {}", path.display());
    let store = SqliteIngestionStore::open(&path).await?;
    Ok(Arc::new(store))
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_with(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run {
            slug,
            root_url,
            mode,
            urls,
            max_pages,
            force_refresh,
            json,
            memory,
        } => {
            let args = ingest::RunArgs {
                slug,
                root_url,
                mode,
                urls,
                max_pages,
                force_refresh,
                json,
                memory,
            };
            ingest::cmd_run(&config, args).await
        }
        Commands::Runs { slug, limit } => runs::cmd_runs(&config, slug.as_deref(), limit).await,
        Commands::Risk { command } => match command {
            RiskCommands::Show { hostname } => risk::cmd_risk_show(&config, &hostname).await,
            RiskCommands::List { limit } => risk::cmd_risk_list(&config, limit).await,
            RiskCommands::SetDelay { hostname, delay_ms } => {
                risk::cmd_risk_set_delay(&config, &hostname, delay_ms).await
            }
        },
        Commands::Cache { command } => match command {
            CacheCommands::Purge => cache::cmd_cache_purge(&config).await,
        },
    }
}
