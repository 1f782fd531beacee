//! Payment History
//!
//! Paginated listing of recorded payments and its CSV export.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{Beneficiary, PaymentMethod, PaymentStatus, PaymentWithMember};
use crate::money::format_minor;
use crate::periods::PeriodType;
use crate::services::status_matrix::Pagination;
use crate::store::{BillingStore, PaymentFilter};
use crate::validation::{validate_pagination, validate_tenant_id, validate_year, ValidationError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub member_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPage {
    pub payments: Vec<PaymentWithMember>,
    pub pagination: Pagination,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),
}

/// One exported row; amounts are rendered as decimals
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: Uuid,
    member_id: Uuid,
    member_name: &'a str,
    period_type: PeriodType,
    year: i32,
    month: Option<i32>,
    amount: String,
    method: PaymentMethod,
    status: PaymentStatus,
    paid_at: String,
    beneficiary: Beneficiary,
    reference: Option<&'a str>,
    notes: Option<&'a str>,
    created_at: String,
}

pub async fn list_payments(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    query: &HistoryQuery,
) -> Result<PaymentPage, BillingError> {
    validate_tenant_id(tenant_id)?;
    if let Some(year) = query.year {
        validate_year(year)?;
    }
    if let Some(month) = query.month {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth(month).into());
        }
    }
    let (limit, offset) = validate_pagination(query.page, query.limit)?;

    let filter = PaymentFilter {
        year: query.year,
        month: query.month,
        member_id: query.member_id,
        limit: Some(limit),
        offset,
    };

    let total = store.count_payments(tenant_id, lodge_id, &filter).await?;
    let payments = store.list_payments(tenant_id, lodge_id, &filter).await?;

    Ok(PaymentPage {
        payments,
        pagination: Pagination::new(limit, offset, total),
    })
}

/// Render payments as CSV with a header row
pub fn export_csv(payments: &[PaymentWithMember]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in payments {
        let p = &row.payment;
        writer.serialize(CsvRow {
            id: p.id,
            member_id: p.member_id,
            member_name: &row.member_name,
            period_type: p.period_type,
            year: p.year,
            month: p.month,
            amount: format_minor(p.amount_minor),
            method: p.method,
            status: p.status,
            paid_at: p.paid_at.to_rfc3339(),
            beneficiary: p.beneficiary,
            reference: p.reference.as_deref(),
            notes: p.notes.as_deref(),
            created_at: p.created_at.to_rfc3339(),
        })?;
    }
    if payments.is_empty() {
        writer.write_record(CSV_HEADER)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))
}

/// Header written by `serialize`; emitted explicitly when there are no rows
const CSV_HEADER: [&str; 14] = [
    "id",
    "member_id",
    "member_name",
    "period_type",
    "year",
    "month",
    "amount",
    "method",
    "status",
    "paid_at",
    "beneficiary",
    "reference",
    "notes",
    "created_at",
];
