//! Charge generation and cancellation endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::Charge;
use crate::periods::{PeriodKey, PeriodType};
use crate::services::charge_generator::{
    cancel_charge, generate_charges, generate_year, resolve_amount, GenerationReport,
    PeriodGeneration,
};
use crate::validation::ValidationError;

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateChargesRequest {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    /// MONTHLY only; omitted means all twelve months
    #[serde(default)]
    pub month: Option<i32>,
    /// Defaults to the lodge's configured fee
    #[serde(default)]
    pub expected_amount_minor: Option<i64>,
}

/// Handler for POST /api/billing/charges/generate
///
/// Idempotent: repeating a request reports `created_total = 0`.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateChargesRequest>,
) -> Result<Json<GenerationReport>, ApiError> {
    let store = state.store.as_ref();

    let report = match (request.period_type, request.month) {
        (PeriodType::Monthly, Some(month)) => {
            let amount = resolve_amount(
                store,
                &request.tenant_id,
                request.lodge_id,
                request.period_type,
                request.expected_amount_minor,
            )
            .await?;
            let created = generate_charges(
                store,
                &request.tenant_id,
                request.lodge_id,
                request.period_type,
                request.year,
                Some(month),
                amount,
            )
            .await?;
            GenerationReport {
                period_type: request.period_type,
                year: request.year,
                expected_amount_minor: amount,
                periods: vec![PeriodGeneration {
                    period_id: PeriodKey::monthly(request.year, month)?.period_id(),
                    created,
                }],
                created_total: created,
            }
        }
        (PeriodType::Annual, Some(month)) => {
            return Err(ValidationError::UnexpectedMonth(month).into());
        }
        (_, None) => {
            generate_year(
                store,
                &request.tenant_id,
                request.lodge_id,
                request.period_type,
                request.year,
                request.expected_amount_minor,
            )
            .await?
        }
    };

    state
        .metrics
        .charges_generated_total
        .with_label_values(&[report.period_type.as_str()])
        .inc_by(report.created_total);

    Ok(Json(report))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CancelChargeRequest {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub member_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    #[serde(default)]
    pub month: Option<i32>,
}

/// Handler for POST /api/billing/charges/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CancelChargeRequest>,
) -> Result<Json<Charge>, ApiError> {
    let period = PeriodKey::new(request.period_type, request.year, request.month)?;

    let charge = cancel_charge(
        state.store.as_ref(),
        &request.tenant_id,
        request.lodge_id,
        request.member_id,
        &period,
    )
    .await?;

    Ok(Json(charge))
}
