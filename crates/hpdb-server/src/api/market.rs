use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiResponse, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct MarketDataQuery {
    pub asset_type: Option<String>,
    pub filtered_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct MarketBenchmarkItem {
    provider: String,
    geography: String,
    asset_type: String,
    metric_name: String,
    unit_type: Option<String>,
    value: Decimal,
    unit: Option<String>,
    filtered: bool,
    observed_on: Option<NaiveDate>,
    source_uri: Option<String>,
}

/// GET /api/v1/market-data/{geography}
pub(super) async fn list_market_data(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(geography): Path<String>,
    Query(query): Query<MarketDataQuery>,
) -> Result<Json<ApiResponse<Vec<MarketBenchmarkItem>>>, ApiError> {
    let rows = hpdb_db::list_market_benchmarks(
        &state.pool,
        geography.trim(),
        hpdb_db::BenchmarkFilter {
            asset_type: query.asset_type.as_deref().filter(|s| !s.trim().is_empty()),
            filtered_only: query.filtered_only.unwrap_or(false),
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| MarketBenchmarkItem {
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
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}
