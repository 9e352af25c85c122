//! OM sheet upload: the CSV template posted as the request body.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use hpdb_core::{ComparisonRow, NewMetric, OmContext};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::deals::RecordedMetricItem;
use super::{map_db_error, ApiError, ApiResponse, AppState};

const CSV_CONTENT_TYPES: [&str; 3] = ["text/csv", "application/csv", "text/plain"];

#[derive(Debug, Deserialize)]
pub(super) struct UploadQuery {
    pub deal_id: Option<String>,
    pub period: Option<String>,
    pub asset_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct UploadedDeal {
    deal_id: String,
    recorded: Vec<RecordedMetricItem>,
    comparison: Vec<ComparisonRow>,
}

fn is_csv(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return true;
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| {
            CSV_CONTENT_TYPES
                .iter()
                .any(|csv| mime.eq_ignore_ascii_case(csv))
        })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /api/v1/om-uploads
///
/// Body is the OM template as CSV, one property per row. Every row is
/// expanded, each metric recorded and validated, and each deal's comparison
/// returned. The upload is rejected before anything is written if any row
/// fails to parse.
pub(super) async fn upload_om_sheet(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Vec<UploadedDeal>>>), ApiError> {
    let rid = &req_id.0;
    if !is_csv(&headers) {
        return Err(ApiError::new(
            rid.as_str(),
            "unsupported_media_type",
            "OM uploads must be sent as text/csv",
        ));
    }

    let settings = &state.settings;
    let ctx = OmContext {
        deal_id: non_blank(query.deal_id),
        asset_type: non_blank(query.asset_type)
            .unwrap_or_else(|| settings.default_asset_type.clone()),
        default_geography: settings.default_geography.clone(),
        period: non_blank(query.period),
        source_uri: Some(format!("upload:{rid}")),
    };

    let metrics: Vec<NewMetric> = hpdb_core::read_om_sheets(body.as_ref())
        .and_then(|sheets| hpdb_core::expand_sheets(&sheets, &ctx))
        .map_err(|e| ApiError::new(rid.as_str(), "validation_error", e.to_string()))?;

    let mut by_deal: BTreeMap<String, Vec<RecordedMetricItem>> = BTreeMap::new();
    for metric in metrics {
        let outcome = hpdb_db::record_and_validate(&state.pool, &metric, settings.validation)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;
        by_deal
            .entry(metric.deal_id.clone())
            .or_default()
            .push(RecordedMetricItem::new(metric, outcome));
    }

    let mut deals = Vec::with_capacity(by_deal.len());
    for (deal_id, recorded) in by_deal {
        let comparison = hpdb_db::compare_deal(&state.pool, &deal_id, &settings.policy)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;
        tracing::info!(deal_id = %deal_id, metrics = recorded.len(), "OM sheet uploaded");
        deals.push(UploadedDeal {
            deal_id,
            recorded,
            comparison,
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(deals, req_id.0)),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn csv_content_types_are_accepted() {
        assert!(is_csv(&HeaderMap::new()));
        assert!(is_csv(&with_content_type("text/csv")));
        assert!(is_csv(&with_content_type("Text/CSV; charset=utf-8")));
        assert!(!is_csv(&with_content_type("application/json")));
    }
}
