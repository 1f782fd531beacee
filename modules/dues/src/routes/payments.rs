//! Payment recording and history endpoints

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::services::payment_history::{export_csv, list_payments, HistoryQuery};
use crate::services::payment_ledger::{record_payment, RecordPaymentRequest, RecordedPayment};
use crate::services::snapshot_aggregator::refresh_snapshot;

/// Handler for POST /api/billing/payments
///
/// Records a CONFIRMED payment (201). A second payment for the same member
/// and period returns 409 DUPLICATE_PAYMENT. After a successful write the
/// period's KPI snapshot is refreshed; a refresh failure is logged and does
/// not fail the request.
pub async fn record(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordedPayment>), ApiError> {
    let method = request.method;

    let recorded = match record_payment(state.store.as_ref(), request).await {
        Ok(recorded) => recorded,
        Err(e) => {
            state
                .metrics
                .payments_rejected_total
                .with_label_values(&[e.code()])
                .inc();
            return Err(e.into());
        }
    };

    state
        .metrics
        .payments_recorded_total
        .with_label_values(&[method.as_str(), if recorded.unmatched { "false" } else { "true" }])
        .inc();

    let payment = &recorded.payment;
    let refresh = refresh_snapshot(
        state.store.as_ref(),
        &payment.tenant_id,
        payment.lodge_id,
        payment.period_type,
        payment.year,
        payment.month,
    )
    .await;

    let result = match refresh {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(
                tenant_id = %payment.tenant_id,
                lodge_id = %payment.lodge_id,
                payment_id = %payment.id,
                error = %e,
                "KPI snapshot refresh after payment failed"
            );
            "error"
        }
    };
    state
        .metrics
        .snapshot_refresh_total
        .with_label_values(&["payment", result])
        .inc();

    Ok((StatusCode::CREATED, Json(recorded)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub member_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub format: HistoryFormat,
}

/// Handler for GET /api/billing/payments/history
///
/// `format=csv` returns the same page as a CSV attachment.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let started = crate::metrics::Metrics::timer();
    let query = HistoryQuery {
        year: params.year,
        month: params.month,
        member_id: params.member_id,
        page: params.page,
        limit: params.limit,
    };

    let page = list_payments(state.store.as_ref(), &params.tenant_id, params.lodge_id, &query).await?;
    state.metrics.observe_read("history", started);

    match params.format {
        HistoryFormat::Json => Ok(Json(page).into_response()),
        HistoryFormat::Csv => {
            let body = export_csv(&page.payments).map_err(|e| {
                tracing::error!(error = %e, "Payment history CSV export failed");
                ApiError::internal("CSV export failed")
            })?;
            let disposition = format!(
                "attachment; filename=\"payment-history-{}.csv\"",
                chrono::Utc::now().timestamp_millis()
            );
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response())
        }
    }
}
