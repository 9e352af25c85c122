mod db;
mod ingest;
mod report;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hpdb_core::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::db::DbCommands;
use crate::ingest::IngestArgs;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Parser)]
#[command(name = "hpdb-cli")]
#[command(about = "Offering Memorandum metric validation and market comparison")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Ingest an OM sheet (CSV, one property per row) and validate every metric
    Ingest {
        /// Path to the OM CSV file
        path: PathBuf,
        /// Use this deal id instead of deriving one from the address
        #[arg(long)]
        deal_id: Option<String>,
        /// Reporting period label stored with each metric (e.g. 2026-Q3)
        #[arg(long)]
        period: Option<String>,
        /// Asset type; defaults to `HPDB_DEFAULT_ASSET_TYPE`
        #[arg(long)]
        asset_type: Option<String>,
        /// Validate against the rules file and print findings without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the market comparison report for a deal
    Report {
        deal_id: String,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the OM upload template as CSV
    Template,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("hpdb-cli: no command given; run with --help for usage");
        return Ok(());
    };

    match command {
        Commands::Template => {
            init_tracing(DEFAULT_LOG_LEVEL)?;
            report::write_template(std::io::stdout().lock())
        }
        Commands::Db { command } => {
            let config = load_config()?;
            let pool = connect(&config).await?;
            db::run_db_command(&pool, &config, command).await
        }
        Commands::Ingest {
            path,
            deal_id,
            period,
            asset_type,
            dry_run,
        } => {
            let config = load_config()?;
            let args = IngestArgs {
                path,
                deal_id,
                period,
                asset_type,
            };
            if dry_run {
                ingest::run_ingest_dry_run(&config, &args)
            } else {
                let pool = connect(&config).await?;
                ingest::run_ingest(&pool, &config, &args).await
            }
        }
        Commands::Report { deal_id, json } => {
            let config = load_config()?;
            let pool = connect(&config).await?;
            report::run_report(&pool, &config, &deal_id, json).await
        }
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = hpdb_core::load_app_config().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = hpdb_db::PoolConfig::from_app_config(config);
    hpdb_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")
}
