//! Database operations for `investor_metrics` and `metric_flags`.

use chrono::{DateTime, Utc};
use hpdb_core::{
    validate, FlagKind, Finding, NewMetric, Rule, Severity, SubmittedMetric, ValidationOptions,
};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::rules::RuleRow;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `investor_metrics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricRow {
    pub id: i64,
    pub deal_id: String,
    pub geography: String,
    pub asset_type: String,
    pub metric_name: String,
    pub unit_type: Option<String>,
    pub value: Option<Decimal>,
    pub unit: Option<String>,
    pub period: Option<String>,
    pub source_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MetricRow> for SubmittedMetric {
    fn from(row: MetricRow) -> Self {
        SubmittedMetric {
            id: row.id,
            deal_id: row.deal_id,
            geography: row.geography,
            asset_type: row.asset_type,
            metric_name: row.metric_name,
            unit_type: row.unit_type,
            value: row.value,
            unit: row.unit,
            period: row.period,
            source_uri: row.source_uri,
            created_at: row.created_at,
        }
    }
}

/// A row from the `metric_flags` table.
///
/// `flag_type` and `severity` are kept as stored text; use [`FlagRow::kind`]
/// and [`FlagRow::severity`] for the typed values.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlagRow {
    pub id: i64,
    pub metric_id: i64,
    pub flag_type: String,
    pub severity: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl FlagRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidStoredValue`] for an unknown flag type.
    pub fn kind(&self) -> Result<FlagKind, DbError> {
        Ok(self.flag_type.parse::<FlagKind>()?)
    }

    /// # Errors
    ///
    /// Returns [`DbError::InvalidStoredValue`] for an unknown severity.
    pub fn severity(&self) -> Result<Severity, DbError> {
        Ok(self.severity.parse::<Severity>()?)
    }
}

/// Outcome of one [`record_and_validate`] call.
#[derive(Debug, Clone)]
pub struct RecordedMetric {
    pub metric_id: i64,
    pub created_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

const METRIC_COLUMNS: &str = "id, deal_id, geography, asset_type, metric_name, unit_type, \
                              value, unit, period, source_uri, created_at";

/// Store a metric, validate it against its rule, and store the findings.
///
/// The rule lookup, metric insert and flag inserts share one transaction:
/// either the metric lands with every one of its flags or nothing is written.
/// Findings never block the insert.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn record_and_validate(
    pool: &PgPool,
    metric: &NewMetric,
    options: ValidationOptions,
) -> Result<RecordedMetric, DbError> {
    let mut tx = pool.begin().await?;

    let rule: Option<Rule> = sqlx::query_as::<_, RuleRow>(
        "SELECT id, metric_name, unit, min_value, max_value, must_be_nonzero, \
                is_percentage, notes, created_at, updated_at \
         FROM metric_rules WHERE metric_name = $1",
    )
    .bind(&metric.metric_name)
    .fetch_optional(&mut *tx)
    .await?
    .map(Rule::from);

    let (metric_id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO investor_metrics \
             (deal_id, geography, asset_type, metric_name, unit_type, value, unit, period, source_uri) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id, created_at",
    )
    .bind(&metric.deal_id)
    .bind(&metric.geography)
    .bind(&metric.asset_type)
    .bind(&metric.metric_name)
    .bind(metric.unit_type())
    .bind(metric.value)
    .bind(&metric.unit)
    .bind(&metric.period)
    .bind(&metric.source_uri)
    .fetch_one(&mut *tx)
    .await?;

    let findings = validate(metric.as_value(), rule.as_ref(), options);

    for finding in &findings {
        sqlx::query(
            "INSERT INTO metric_flags (metric_id, flag_type, severity, message) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(metric_id)
        .bind(finding.kind.as_str())
        .bind(finding.severity.as_str())
        .bind(&finding.message)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!(
        deal_id = %metric.deal_id,
        metric = %metric.metric_name,
        metric_id,
        flags = findings.len(),
        "metric recorded"
    );

    Ok(RecordedMetric {
        metric_id,
        created_at,
        findings,
    })
}

/// List all stored metrics for a deal, oldest first within each metric.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_deal_metrics(pool: &PgPool, deal_id: &str) -> Result<Vec<MetricRow>, DbError> {
    let rows = sqlx::query_as::<_, MetricRow>(&format!(
        "SELECT {METRIC_COLUMNS} FROM investor_metrics \
         WHERE deal_id = $1 \
         ORDER BY metric_name, unit_type NULLS FIRST, created_at, id"
    ))
    .bind(deal_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List the flags attached to one metric, in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_metric_flags(pool: &PgPool, metric_id: i64) -> Result<Vec<FlagRow>, DbError> {
    let rows = sqlx::query_as::<_, FlagRow>(
        "SELECT id, metric_id, flag_type, severity, message, created_at \
         FROM metric_flags WHERE metric_id = $1 ORDER BY id",
    )
    .bind(metric_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List every flag on every metric of a deal.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_deal_flags(pool: &PgPool, deal_id: &str) -> Result<Vec<FlagRow>, DbError> {
    let rows = sqlx::query_as::<_, FlagRow>(
        "SELECT f.id, f.metric_id, f.flag_type, f.severity, f.message, f.created_at \
         FROM metric_flags f \
         JOIN investor_metrics m ON m.id = f.metric_id \
         WHERE m.deal_id = $1 \
         ORDER BY f.metric_id, f.id",
    )
    .bind(deal_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete a metric. Its flags go with it via `ON DELETE CASCADE`.
///
/// Returns `false` when no metric had that id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_metric(pool: &PgPool, metric_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM investor_metrics WHERE id = $1")
        .bind(metric_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
