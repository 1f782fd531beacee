use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub annual_period_span: u32,
}

/// Liveness plus the billing store backend in use
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "dues-rs",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend(),
        annual_period_span: state.annual_span,
    })
}
