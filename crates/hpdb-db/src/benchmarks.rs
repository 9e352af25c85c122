//! Database operations for `market_metrics` (provider benchmarks).

use chrono::{DateTime, NaiveDate, Utc};
use hpdb_core::MarketBenchmark;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `market_metrics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BenchmarkRow {
    pub id: i64,
    pub provider: String,
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    pub unit_type: Option<String>,
    pub value: Decimal,
    pub unit: Option<String>,
    pub filtered: bool,
    pub observed_on: Option<NaiveDate>,
    pub source_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<BenchmarkRow> for MarketBenchmark {
    fn from(row: BenchmarkRow) -> Self {
        MarketBenchmark {
            provider: row.provider,
            geography: row.geography,
            asset_type: row.asset_type,
            metric_name: row.metric_name,
            unit_type: row.unit_type,
            value: row.value,
            unit: row.unit,
            filtered: row.filtered,
            observed_on: row.observed_on,
            source_uri: row.source_uri,
        }
    }
}

/// Query filter for [`list_market_benchmarks`].
#[derive(Debug, Clone, Default)]
pub struct BenchmarkFilter<'a> {
    pub asset_type: Option<&'a str>,
    pub filtered_only: bool,
}

const BENCHMARK_COLUMNS: &str = "id, provider, geography, asset_type, metric_name, unit_type, \
                                 value, unit, filtered, observed_on, source_uri, created_at";

const INSERT_BENCHMARK: &str = "INSERT INTO market_metrics \
         (provider, geography, asset_type, metric_name, unit_type, value, unit, \
          filtered, observed_on, source_uri) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
     RETURNING id";

/// Insert one benchmark observation and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_benchmark(pool: &PgPool, benchmark: &MarketBenchmark) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(INSERT_BENCHMARK)
        .bind(&benchmark.provider)
        .bind(&benchmark.geography)
        .bind(&benchmark.asset_type)
        .bind(&benchmark.metric_name)
        .bind(benchmark.unit_type())
        .bind(benchmark.value)
        .bind(&benchmark.unit)
        .bind(benchmark.filtered)
        .bind(benchmark.observed_on)
        .bind(&benchmark.source_uri)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

/// Insert a batch of benchmarks in a single transaction.
///
/// If any insert fails the whole batch is rolled back. Returns the number of
/// rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn load_benchmarks(pool: &PgPool, benchmarks: &[MarketBenchmark]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;

    for benchmark in benchmarks {
        sqlx::query_scalar::<_, i64>(INSERT_BENCHMARK)
            .bind(&benchmark.provider)
            .bind(&benchmark.geography)
            .bind(&benchmark.asset_type)
            .bind(&benchmark.metric_name)
            .bind(benchmark.unit_type())
            .bind(benchmark.value)
            .bind(&benchmark.unit)
            .bind(benchmark.filtered)
            .bind(benchmark.observed_on)
            .bind(&benchmark.source_uri)
            .fetch_one(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(benchmarks.len())
}

/// List benchmarks for a geography, optionally narrowed by asset type and to
/// filtered rows only.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_market_benchmarks(
    pool: &PgPool,
    geography: &str,
    filter: BenchmarkFilter<'_>,
) -> Result<Vec<BenchmarkRow>, DbError> {
    let rows = sqlx::query_as::<_, BenchmarkRow>(&format!(
        "SELECT {BENCHMARK_COLUMNS} FROM market_metrics \
         WHERE geography = $1 \
           AND ($2::TEXT IS NULL OR asset_type = $2) \
           AND (NOT $3 OR filtered) \
         ORDER BY asset_type, metric_name, unit_type NULLS FIRST, provider, id"
    ))
    .bind(geography)
    .bind(filter.asset_type)
    .bind(filter.filtered_only)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Filtered benchmarks for every (geography, asset type) a deal was submitted under.
pub(crate) async fn filtered_benchmarks_for_deal(
    pool: &PgPool,
    deal_id: &str,
) -> Result<Vec<BenchmarkRow>, DbError> {
    let rows = sqlx::query_as::<_, BenchmarkRow>(&format!(
        "SELECT {BENCHMARK_COLUMNS} FROM market_metrics \
         WHERE filtered \
           AND (geography, asset_type) IN ( \
               SELECT DISTINCT geography, asset_type FROM investor_metrics WHERE deal_id = $1 \
           ) \
         ORDER BY id"
    ))
    .bind(deal_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
