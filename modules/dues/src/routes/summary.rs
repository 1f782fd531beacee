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
use crate::services::summary_reader::{self, BillingSummary};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
}

/// Handler for GET /api/billing/summary
///
/// ANNUAL reads come from the KPI snapshot when present
/// (`data_source = "snapshot"`); everything else is computed.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<BillingSummary>, ApiError> {
    let started = Metrics::timer();
    let summary = summary_reader::get_summary(
        state.store.as_ref(),
        &query.tenant_id,
        query.lodge_id,
        query.period_type,
        query.year,
    )
    .await?;
    state.metrics.observe_read("summary", started);

    Ok(Json(summary))
}
