//! Status Matrix Builder
//!
//! Assembles the member × period payment grid shown by the dues screen.
//! The grid is built from a fixed number of bulk reads (member page, member
//! count, charges, payments) joined in memory, whatever the page size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{Charge, ChargeStatus, Member, Payment};
use crate::periods::{catalog, Period, PeriodKey, PeriodType, DEFAULT_ANNUAL_SPAN};
use crate::store::{BillingScope, BillingStore, MemberFilter};
use crate::validation::{validate_pagination, validate_tenant_id, validate_year};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRequest {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    /// Restrict the grid to one member's row
    pub member_id: Option<Uuid>,
    /// Years shown for ANNUAL grids
    pub annual_span: u32,
}

impl GridRequest {
    pub fn new(tenant_id: &str, lodge_id: Uuid, period_type: PeriodType, year: i32) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            lodge_id,
            period_type,
            year,
            page: None,
            limit: None,
            search: None,
            member_id: None,
            annual_span: DEFAULT_ANNUAL_SPAN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMember {
    pub id: Uuid,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStatus {
    pub is_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// `None` when no charge was generated for the cell
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_status: Option<ChargeStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_amount_minor: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64, total: i64) -> Self {
        Self {
            page: offset / limit + 1,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGrid {
    pub members: Vec<GridMember>,
    pub periods: Vec<Period>,
    /// Keyed by `"{member_id}-{period_id}"`
    pub statuses: HashMap<String, CellStatus>,
    pub pagination: Pagination,
}

pub fn cell_key(member_id: Uuid, period_id: &str) -> String {
    format!("{}-{}", member_id, period_id)
}

pub async fn build_grid(store: &dyn BillingStore, request: &GridRequest) -> Result<PaymentGrid, BillingError> {
    validate_tenant_id(&request.tenant_id)?;
    validate_year(request.year)?;
    let (limit, offset) = validate_pagination(request.page, request.limit)?;

    let periods = catalog(request.period_type, request.year, request.annual_span);
    let last_year = periods.last().map_or(request.year, |p| p.year);

    let filter = MemberFilter {
        search: request.search.clone().filter(|s| !s.trim().is_empty()),
        member_id: request.member_id,
        limit: Some(limit),
        offset,
    };

    let tenant_id = request.tenant_id.as_str();
    let members = store
        .list_active_members(tenant_id, request.lodge_id, &filter)
        .await?;
    let total = store
        .count_active_members(tenant_id, request.lodge_id, &filter)
        .await?;

    let mut statuses = HashMap::new();
    if !members.is_empty() {
        let scope = BillingScope::years(request.period_type, request.year, last_year)
            .with_members(members.iter().map(|m| m.id).collect());
        let charges = store
            .list_charges(tenant_id, request.lodge_id, &scope)
            .await?;
        let payments = store
            .list_confirmed_payments(tenant_id, request.lodge_id, &scope)
            .await?;
        statuses = join_cells(&members, &periods, &charges, &payments);
    }

    tracing::debug!(
        tenant_id = %tenant_id,
        lodge_id = %request.lodge_id,
        period_type = %request.period_type,
        year = request.year,
        members = members.len(),
        periods = periods.len(),
        "Payment grid built"
    );

    Ok(PaymentGrid {
        members: members
            .into_iter()
            .map(|m| GridMember {
                id: m.id,
                full_name: m.full_name,
            })
            .collect(),
        periods,
        statuses,
        pagination: Pagination::new(limit, offset, total),
    })
}

/// Join pre-fetched rows into one cell per member × period
fn join_cells(
    members: &[Member],
    periods: &[Period],
    charges: &[Charge],
    payments: &[Payment],
) -> HashMap<String, CellStatus> {
    let charge_by_cell: HashMap<(Uuid, PeriodKey), &Charge> = charges
        .iter()
        .map(|c| ((c.member_id, c.period_key()), c))
        .collect();

    let mut latest_payment: HashMap<(Uuid, PeriodKey), &Payment> = HashMap::new();
    for payment in payments {
        latest_payment
            .entry((payment.member_id, payment.period_key()))
            .and_modify(|current| {
                if payment.paid_at > current.paid_at {
                    *current = payment;
                }
            })
            .or_insert(payment);
    }

    let mut statuses = HashMap::with_capacity(members.len() * periods.len());
    for member in members {
        for period in periods {
            let key = (member.id, period.key());
            let charge = charge_by_cell.get(&key);
            let payment = latest_payment.get(&key);
            statuses.insert(
                cell_key(member.id, &period.id),
                CellStatus {
                    is_paid: payment.is_some(),
                    amount_minor: payment.map(|p| p.amount_minor),
                    paid_at: payment.map(|p| p.paid_at),
                    charge_status: charge.map(|c| c.status),
                    expected_amount_minor: charge.map(|c| c.expected_amount_minor),
                },
            );
        }
    }
    statuses
}
