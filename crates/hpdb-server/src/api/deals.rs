//! Deal-scoped endpoints: metric submission, stored metrics, comparison.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use hpdb_core::{ComparisonRow, Finding, NewMetric};
use hpdb_db::RecordedMetric;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

const MAX_METRICS_PER_REQUEST: usize = 500;

#[derive(Debug, Deserialize)]
pub(super) struct SubmitMetricsRequest {
    pub metrics: Vec<MetricInput>,
}

#[derive(Debug, Deserialize)]
pub(super) struct MetricInput {
    pub metric_name: String,
    #[serde(default)]
    pub unit_type: Option<String>,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RecordedMetricItem {
    metric_id: i64,
    metric_name: String,
    unit_type: Option<String>,
    value: Option<Decimal>,
    created_at: DateTime<Utc>,
    flags: Vec<Finding>,
}

impl RecordedMetricItem {
    pub(super) fn new(metric: NewMetric, outcome: RecordedMetric) -> Self {
        Self {
            metric_id: outcome.metric_id,
            unit_type: metric.unit_type().map(ToOwned::to_owned),
            metric_name: metric.metric_name,
            value: metric.value,
            created_at: outcome.created_at,
            flags: outcome.findings,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct SubmitMetricsData {
    deal_id: String,
    recorded: Vec<RecordedMetricItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct FlagItem {
    flag_type: String,
    severity: String,
    message: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct StoredMetricItem {
    metric_id: i64,
    geography: String,
    asset_type: String,
    metric_name: String,
    unit_type: Option<String>,
    value: Option<Decimal>,
    unit: Option<String>,
    period: Option<String>,
    source_uri: Option<String>,
    created_at: DateTime<Utc>,
    flags: Vec<FlagItem>,
}

fn validate_submission(
    rid: &str,
    deal_id: &str,
    body: &SubmitMetricsRequest,
) -> Result<(), ApiError> {
    if deal_id.trim().is_empty() {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "deal_id must be non-empty",
        ));
    }
    if body.metrics.is_empty() {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "metrics must contain at least one entry",
        ));
    }
    if body.metrics.len() > MAX_METRICS_PER_REQUEST {
        return Err(ApiError::new(
            rid,
            "validation_error",
            format!("at most {MAX_METRICS_PER_REQUEST} metrics per request"),
        ));
    }
    if let Some(index) = body
        .metrics
        .iter()
        .position(|m| m.metric_name.trim().is_empty())
    {
        return Err(ApiError::new(
            rid,
            "validation_error",
            format!("metrics[{index}].metric_name must be non-empty"),
        ));
    }
    Ok(())
}

/// POST /api/v1/deals/{deal_id}/metrics
///
/// Each metric is recorded and validated in its own transaction, in request
/// order. A database failure stops the batch; earlier metrics stay recorded.
pub(super) async fn submit_deal_metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(deal_id): Path<String>,
    Json(body): Json<SubmitMetricsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitMetricsData>>), ApiError> {
    let rid = &req_id.0;
    validate_submission(rid, &deal_id, &body)?;

    let settings = &state.settings;
    let mut recorded = Vec::with_capacity(body.metrics.len());

    for input in body.metrics {
        let metric = NewMetric {
            deal_id: deal_id.clone(),
            geography: input
                .geography
                .unwrap_or_else(|| settings.default_geography.clone()),
            asset_type: input
                .asset_type
                .unwrap_or_else(|| settings.default_asset_type.clone()),
            metric_name: input.metric_name.trim().to_string(),
            unit_type: input.unit_type,
            value: input.value,
            unit: input.unit,
            period: input.period,
            source_uri: input.source_uri,
        };

        let outcome = hpdb_db::record_and_validate(&state.pool, &metric, settings.validation)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;

        recorded.push(RecordedMetricItem::new(metric, outcome));
    }

    tracing::info!(deal_id = %deal_id, count = recorded.len(), "metrics submitted");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            SubmitMetricsData { deal_id, recorded },
            req_id.0,
        )),
    ))
}

/// GET /api/v1/deals/{deal_id}/metrics
pub(super) async fn list_deal_metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(deal_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<StoredMetricItem>>>, ApiError> {
    let rid = &req_id.0;
    let metrics = hpdb_db::list_deal_metrics(&state.pool, &deal_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if metrics.is_empty() {
        return Err(deal_not_found(rid, &deal_id));
    }

    let mut flags_by_metric: HashMap<i64, Vec<FlagItem>> = HashMap::new();
    for flag in hpdb_db::list_deal_flags(&state.pool, &deal_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
    {
        flags_by_metric
            .entry(flag.metric_id)
            .or_default()
            .push(FlagItem {
                flag_type: flag.flag_type,
                severity: flag.severity,
                message: flag.message,
                created_at: flag.created_at,
            });
    }

    let data = metrics
        .into_iter()
        .map(|row| StoredMetricItem {
            flags: flags_by_metric.remove(&row.id).unwrap_or_default(),
            metric_id: row.id,
            geography: row.geography,
            asset_type: row.asset_type,
            metric_name: row.metric_name,
            unit_type: row.unit_type,
            value: row.value,
            unit: row.unit,
            period: row.period,
            source_uri: row.source_uri,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// GET /api/v1/deals/{deal_id}/comparison
pub(super) async fn get_deal_comparison(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(deal_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ComparisonRow>>>, ApiError> {
    let rid = &req_id.0;
    let rows = hpdb_db::compare_deal(&state.pool, &deal_id, &state.settings.policy)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if rows.is_empty() {
        return Err(deal_not_found(rid, &deal_id));
    }

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}

fn deal_not_found(rid: &str, deal_id: &str) -> ApiError {
    ApiError::new(
        rid,
        "not_found",
        format!("no metrics recorded for deal '{deal_id}'"),
    )
}
