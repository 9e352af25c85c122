//! Database operations for `metric_rules`.

use chrono::{DateTime, Utc};
use hpdb_core::{Rule, RuleBook};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const RULE_COLUMNS: &str = "id, metric_name, unit, min_value, max_value, must_be_nonzero, \
                            is_percentage, notes, created_at, updated_at";

/// A row from the `metric_rules` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleRow {
    pub id: i64,
    pub metric_name: String,
    pub unit: Option<String>,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
    pub must_be_nonzero: bool,
    pub is_percentage: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RuleRow> for Rule {
    fn from(row: RuleRow) -> Self {
        Rule {
            metric_name: row.metric_name,
            unit: row.unit,
            min_value: row.min_value,
            max_value: row.max_value,
            must_be_nonzero: row.must_be_nonzero,
            is_percentage: row.is_percentage,
            notes: row.notes,
        }
    }
}

/// Insert rules that do not exist yet.
///
/// Existing rows are never overwritten, so re-seeding after a manual edit
/// keeps the edit. Returns the number of newly inserted rules. All inserts run
/// in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn seed_rules(pool: &PgPool, rules: &[Rule]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for rule in rules {
        let result = sqlx::query(
            "INSERT INTO metric_rules \
                 (metric_name, unit, min_value, max_value, must_be_nonzero, is_percentage, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (metric_name) DO NOTHING",
        )
        .bind(&rule.metric_name)
        .bind(&rule.unit)
        .bind(rule.min_value)
        .bind(rule.max_value)
        .bind(rule.must_be_nonzero)
        .bind(rule.is_percentage)
        .bind(&rule.notes)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Fetch the rule for one metric name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_rule(pool: &PgPool, metric_name: &str) -> Result<Option<RuleRow>, DbError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM metric_rules WHERE metric_name = $1"
    ))
    .bind(metric_name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// List every rule ordered by metric name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_rules(pool: &PgPool) -> Result<Vec<RuleRow>, DbError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM metric_rules ORDER BY metric_name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Load every stored rule into an in-memory [`RuleBook`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_rule_book(pool: &PgPool) -> Result<RuleBook, DbError> {
    let rows = list_rules(pool).await?;
    Ok(rows.into_iter().map(Rule::from).collect())
}

/// Overwrite the stored rule for `rule.metric_name` and bump `updated_at`.
///
/// This is the explicit edit path; seeding never calls it.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no rule exists for the metric name, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_rule(pool: &PgPool, rule: &Rule) -> Result<RuleRow, DbError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "UPDATE metric_rules \
         SET unit = $2, min_value = $3, max_value = $4, must_be_nonzero = $5, \
             is_percentage = $6, notes = $7, updated_at = NOW() \
         WHERE metric_name = $1 \
         RETURNING {RULE_COLUMNS}"
    ))
    .bind(&rule.metric_name)
    .bind(&rule.unit)
    .bind(rule.min_value)
    .bind(rule.max_value)
    .bind(rule.must_be_nonzero)
    .bind(rule.is_percentage)
    .bind(&rule.notes)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}
