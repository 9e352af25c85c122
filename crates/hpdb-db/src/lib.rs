use hpdb_core::{AppConfig, CoreError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/hpdb-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    /// A stored text column no longer parses into its domain enum.
    #[error("invalid stored value: {0}")]
    InvalidStoredValue(#[from] CoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Open the shared pool used by the CLI and the server.
///
/// # Errors
///
/// Fails when Postgres is unreachable within the acquire timeout.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Apply pending schema migrations and report how many were new.
///
/// # Errors
///
/// Fails on the first migration that does not apply cleanly.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // _sqlx_migrations does not exist on a fresh database; count that as zero.
    let applied_before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = applied_migrations(pool).await;

    Ok(usize::try_from(applied_after - applied_before).unwrap_or(0))
}

async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Round-trip a trivial query.
///
/// # Errors
///
/// Fails when no connection can be acquired or the query errors.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Ping, then confirm the rule table exists so a database that was never
/// migrated reports unhealthy.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    let rules: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metric_rules")
        .fetch_one(pool)
        .await?;
    tracing::trace!(rules, "health check passed");
    Ok(())
}


pub mod benchmarks;
pub mod comparison;
pub mod metrics;
pub mod rules;

pub use benchmarks::{
    insert_benchmark, list_market_benchmarks, load_benchmarks, BenchmarkFilter, BenchmarkRow,
};
pub use comparison::compare_deal;
pub use metrics::{
    delete_metric, list_deal_flags, list_deal_metrics, list_metric_flags, record_and_validate,
    FlagRow, MetricRow, RecordedMetric,
};
pub use rules::{get_rule, list_rules, load_rule_book, seed_rules, update_rule, RuleRow};
