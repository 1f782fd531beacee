use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::metrics::Metrics;
use crate::periods::PeriodType;
use crate::services::status_matrix::{build_grid, GridRequest, PaymentGrid};

#[derive(Debug, Deserialize)]
pub struct MatrixQuery {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub member_id: Option<Uuid>,
}

/// Handler for GET /api/billing/dues/matrix
pub async fn get_matrix(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MatrixQuery>,
) -> Result<Json<PaymentGrid>, ApiError> {
    let started = Metrics::timer();
    let request = GridRequest {
        tenant_id: query.tenant_id,
        lodge_id: query.lodge_id,
        period_type: query.period_type,
        year: query.year,
        page: query.page,
        limit: query.limit,
        search: query.search,
        member_id: query.member_id,
        annual_span: state.annual_span,
    };

    let grid = build_grid(state.store.as_ref(), &request).await?;
    state.metrics.observe_read("matrix", started);

    Ok(Json(grid))
}
