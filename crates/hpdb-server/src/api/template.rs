use axum::{Extension, Json};
use serde::Serialize;

use crate::middleware::RequestId;

use super::ApiResponse;

#[derive(Debug, Serialize)]
pub(super) struct CsvTemplateItem {
    columns: Vec<&'static str>,
    /// One example value per column, in column order.
    example: Vec<&'static str>,
}

/// GET /api/v1/csv-template
pub(super) async fn get_csv_template(
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<CsvTemplateItem>> {
    let template = hpdb_core::csv_template();
    let data = CsvTemplateItem {
        columns: template.columns,
        example: template.example.into_iter().map(|(_, value)| value).collect(),
    };
    Json(ApiResponse::new(data, req_id.0))
}
