//! HTTP surface for the billing service
//!
//! Tenant and lodge are explicit request parameters; authentication and role
//! resolution happen upstream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::BillingError;
use crate::health::health;
use crate::metrics::Metrics;
use crate::store::BillingStore;
use crate::validation::ValidationError;

pub mod charges;
pub mod matrix;
pub mod metrics;
pub mod payments;
pub mod snapshots;
pub mod summary;

/// Shared handler state
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub metrics: Metrics,
    /// Years shown in ANNUAL matrices
    pub annual_span: u32,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Billing error HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        });
        (self.status, body).into_response()
    }
}

/// Map service errors to HTTP status codes
impl From<BillingError> for ApiError {
    fn from(error: BillingError) -> Self {
        let status = match &error {
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::DuplicatePayment { .. }
            | BillingError::ChargeCanceled(_)
            | BillingError::ChargeNotCancelable { .. } => StatusCode::CONFLICT,
            BillingError::Store(e) => {
                tracing::error!(error = %e, "Billing store failure");
                return ApiError::internal("Database error"); // Don't leak internal details
            }
        };
        ApiError {
            status,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        BillingError::from(error).into()
    }
}

/// Build the application router (without CORS, which the binary adds)
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/metrics", get(metrics::metrics))
        .route("/api/billing/charges/generate", post(charges::generate))
        .route("/api/billing/charges/cancel", post(charges::cancel))
        .route("/api/billing/payments", post(payments::record))
        .route("/api/billing/payments/history", get(payments::history))
        .route("/api/billing/snapshots/refresh", post(snapshots::refresh))
        .route("/api/billing/summary", get(summary::get_summary))
        .route("/api/billing/dues/matrix", get(matrix::get_matrix))
        .with_state(state)
}
