use hpdb_core::{compare, ComparisonPolicy, ComparisonRow, MarketBenchmark, SubmittedMetric};
use sqlx::PgPool;

use crate::benchmarks::filtered_benchmarks_for_deal;
use crate::metrics::list_deal_metrics;
use crate::DbError;

/// Build the comparison report for one deal from its stored metrics.
///
/// Read-only. A deal with no stored metrics yields an empty report; a
/// partially ingested deal reports whatever has landed so far.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn compare_deal(
    pool: &PgPool,
    deal_id: &str,
    policy: &ComparisonPolicy,
) -> Result<Vec<ComparisonRow>, DbError> {
    let metrics: Vec<SubmittedMetric> = list_deal_metrics(pool, deal_id)
        .await?
        .into_iter()
        .map(SubmittedMetric::from)
        .collect();

    if metrics.is_empty() {
        return Ok(Vec::new());
    }

    let benchmarks: Vec<MarketBenchmark> = filtered_benchmarks_for_deal(pool, deal_id)
        .await?
        .into_iter()
        .map(MarketBenchmark::from)
        .collect();

    Ok(compare(&metrics, &benchmarks, policy))
}
