use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::KpiSnapshot;
use crate::periods::PeriodType;
use crate::services::snapshot_aggregator::{refresh_snapshot, refresh_year};

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshSnapshotRequest {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    /// MONTHLY only; omitted refreshes all twelve months
    #[serde(default)]
    pub month: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshSnapshotResponse {
    pub snapshots: Vec<KpiSnapshot>,
}

/// Handler for POST /api/billing/snapshots/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshSnapshotRequest>,
) -> Result<Json<RefreshSnapshotResponse>, ApiError> {
    let store = state.store.as_ref();

    let result = match (request.period_type, request.month) {
        (PeriodType::Monthly, None) => {
            refresh_year(store, &request.tenant_id, request.lodge_id, request.period_type, request.year)
                .await
        }
        (period_type, month) => {
            refresh_snapshot(store, &request.tenant_id, request.lodge_id, period_type, request.year, month)
                .await
                .map(|snapshot| vec![snapshot])
        }
    };

    let outcome = if result.is_ok() { "ok" } else { "error" };
    state
        .metrics
        .snapshot_refresh_total
        .with_label_values(&["manual", outcome])
        .inc();

    Ok(Json(RefreshSnapshotResponse { snapshots: result? }))
}
