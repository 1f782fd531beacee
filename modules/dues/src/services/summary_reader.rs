//! Billing Summary Reader
//!
//! Read-only yearly totals for a lodge. ANNUAL summaries are served from the
//! KPI snapshot when one exists; MONTHLY summaries are always computed from the
//! year's charges so members are counted once across the twelve months.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::KpiSnapshot;
use crate::periods::{PeriodKey, PeriodType};
use crate::services::snapshot_aggregator::{aggregate_charges, AggregateMode};
use crate::store::{BillingScope, BillingStore, MemberFilter};
use crate::validation::{validate_tenant_id, validate_year};

pub const DATA_SOURCE_SNAPSHOT: &str = "snapshot";
pub const DATA_SOURCE_COMPUTED: &str = "computed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    pub expected_amount_minor: i64,
    pub paid_amount_minor: i64,
    pub open_amount_minor: i64,
    pub members_active: i64,
    pub paid_members: i64,
    pub delinquent_members: i64,
    pub data_source: String, // "snapshot" or "computed"
    pub snapshot_refreshed_at: Option<String>, // RFC 3339, snapshot reads only
}

impl BillingSummary {
    fn from_snapshot(snapshot: KpiSnapshot) -> Self {
        Self {
            tenant_id: snapshot.tenant_id,
            lodge_id: snapshot.lodge_id,
            period_type: snapshot.period_type,
            year: snapshot.year,
            expected_amount_minor: snapshot.expected_amount_minor,
            paid_amount_minor: snapshot.paid_amount_minor,
            open_amount_minor: snapshot.open_amount_minor,
            members_active: snapshot.members_active,
            paid_members: snapshot.paid_members,
            delinquent_members: snapshot.delinquent_members,
            data_source: DATA_SOURCE_SNAPSHOT.to_string(),
            snapshot_refreshed_at: Some(snapshot.refreshed_at.to_rfc3339()),
        }
    }
}

pub async fn get_summary(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    period_type: PeriodType,
    year: i32,
) -> Result<BillingSummary, BillingError> {
    validate_tenant_id(tenant_id)?;

    if period_type == PeriodType::Annual {
        let key = PeriodKey::annual(year)?;
        if let Some(snapshot) = store.find_snapshot(tenant_id, lodge_id, &key).await? {
            return Ok(BillingSummary::from_snapshot(snapshot));
        }
    } else {
        validate_year(year)?;
    }

    let charges = store
        .list_charges(tenant_id, lodge_id, &BillingScope::year(period_type, year))
        .await?;
    let members_active = store
        .count_active_members(tenant_id, lodge_id, &MemberFilter::default())
        .await?;

    let mode = match period_type {
        PeriodType::Monthly => AggregateMode::DistinctMembers,
        PeriodType::Annual => AggregateMode::PerCharge,
    };
    let totals = aggregate_charges(&charges, mode);

    Ok(BillingSummary {
        tenant_id: tenant_id.to_string(),
        lodge_id,
        period_type,
        year,
        expected_amount_minor: totals.expected_amount_minor,
        paid_amount_minor: totals.paid_amount_minor,
        open_amount_minor: totals.open_amount_minor,
        members_active,
        paid_members: totals.paid_members,
        delinquent_members: totals.delinquent_members,
        data_source: DATA_SOURCE_COMPUTED.to_string(),
        snapshot_refreshed_at: None,
    })
}
