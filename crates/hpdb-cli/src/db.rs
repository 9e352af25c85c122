//! `db` sub-commands: connectivity, migrations and seeding.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Subcommand;
use hpdb_core::{AppConfig, MarketBenchmark};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Sub-commands available under `db`.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Insert rules from the rules file that are not in the database yet
    SeedRules {
        /// Rules file; defaults to `HPDB_RULES_PATH`
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Load market benchmarks from a CSV file
    SeedBenchmarks {
        /// Benchmarks CSV (`provider,geography,asset_type,metric_name,...`)
        path: PathBuf,
    },
}

pub(crate) async fn run_db_command(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            hpdb_db::health_check(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = hpdb_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::SeedRules { path } => {
            let path = path.unwrap_or_else(|| config.rules_path.clone());
            let rules_file = hpdb_core::load_rules(&path)
                .with_context(|| format!("failed to load rules from {}", path.display()))?;
            let total = rules_file.rules.len();
            let inserted = hpdb_db::seed_rules(pool, &rules_file.rules).await?;
            tracing::info!(path = %path.display(), total, inserted, "rules seeded");
            println!(
                "seeded {inserted} new rule(s); {} already present",
                total - inserted
            );
        }
        DbCommands::SeedBenchmarks { path } => {
            let benchmarks = read_benchmarks_file(&path)?;
            let loaded = hpdb_db::load_benchmarks(pool, &benchmarks).await?;
            let filtered = benchmarks.iter().filter(|b| b.filtered).count();
            tracing::info!(path = %path.display(), loaded, filtered, "benchmarks loaded");
            println!("loaded {loaded} benchmark row(s), {filtered} eligible for comparison");
        }
    }
    Ok(())
}

/// One line of the benchmarks CSV, kept as text until validated.
#[derive(Debug, Deserialize)]
struct BenchmarkRecord {
    provider: String,
    geography: String,
    asset_type: String,
    metric_name: String,
    unit_type: Option<String>,
    value: String,
    unit: Option<String>,
    #[serde(default)]
    filtered: Option<String>,
    #[serde(default)]
    observed_on: Option<String>,
    #[serde(default)]
    source_uri: Option<String>,
}

fn read_benchmarks_file(path: &Path) -> anyhow::Result<Vec<MarketBenchmark>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open benchmarks file {}", path.display()))?;
    read_benchmarks(file).with_context(|| format!("invalid benchmarks file {}", path.display()))
}

/// Parse benchmark rows from CSV. Errors name the offending line.
pub(crate) fn read_benchmarks<R: Read>(reader: R) -> anyhow::Result<Vec<MarketBenchmark>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut benchmarks = Vec::new();

    for (index, record) in csv.deserialize::<BenchmarkRecord>().enumerate() {
        // header is line 1
        let line = index + 2;
        let record = record.with_context(|| format!("line {line}: malformed row"))?;
        let value = Decimal::from_str(&record.value)
            .with_context(|| format!("line {line}: value '{}' is not a number", record.value))?;
        let filtered = match record.filtered.as_deref() {
            None => false,
            Some(raw) => parse_flag(raw)
                .with_context(|| format!("line {line}: filtered '{raw}' is not a boolean"))?,
        };
        let observed_on = record
            .observed_on
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .with_context(|| format!("line {line}: observed_on '{raw}' is not YYYY-MM-DD"))
            })
            .transpose()?;

        benchmarks.push(MarketBenchmark {
            provider: record.provider,
            geography: record.geography,
            asset_type: record.asset_type,
            metric_name: record.metric_name,
            unit_type: record.unit_type,
            value,
            unit: record.unit,
            filtered,
            observed_on,
            source_uri: record.source_uri,
        });
    }

    Ok(benchmarks)
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        other => anyhow::bail!("unrecognized flag value '{other}'"),
    }
}
