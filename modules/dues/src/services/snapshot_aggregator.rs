//! Snapshot Aggregator
//!
//! Recomputes the KPI rollup for one billing scope from its charges and
//! overwrites the stored snapshot. Refreshes are full overwrites, so
//! concurrent or repeated runs converge on the same row.

use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{Charge, ChargeStatus, KpiSnapshot};
use crate::periods::{keys_for_year, PeriodKey, PeriodType};
use crate::store::{BillingScope, BillingStore, MemberFilter};
use crate::validation::validate_tenant_id;

/// How member counts are derived from charge rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    /// One period: every charge row counts once
    PerCharge,
    /// Several periods: a member counts once however many charges they hold
    DistinctMembers,
}

/// Amount and member totals over a set of charges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeTotals {
    pub expected_amount_minor: i64,
    pub paid_amount_minor: i64,
    pub open_amount_minor: i64,
    pub paid_members: i64,
    pub delinquent_members: i64,
}

/// Sum charges into totals
///
/// `expected` sums every charge in scope, CANCELED included. `paid` is the
/// expected amount of PAID charges, so PARTIAL and CANCELED amounts stay in
/// `open`.
pub fn aggregate_charges(charges: &[Charge], mode: AggregateMode) -> ChargeTotals {
    let mut totals = ChargeTotals::default();
    let mut paid_members: HashSet<Uuid> = HashSet::new();
    let mut delinquent_members: HashSet<Uuid> = HashSet::new();

    for charge in charges {
        match charge.status {
            ChargeStatus::Paid => {
                totals.paid_amount_minor += charge.expected_amount_minor;
                totals.paid_members += 1;
                paid_members.insert(charge.member_id);
            }
            ChargeStatus::Open => {
                totals.delinquent_members += 1;
                delinquent_members.insert(charge.member_id);
            }
            ChargeStatus::Partial | ChargeStatus::Canceled => {}
        }
        totals.expected_amount_minor += charge.expected_amount_minor;
    }

    if mode == AggregateMode::DistinctMembers {
        totals.paid_members = paid_members.len() as i64;
        totals.delinquent_members = delinquent_members.len() as i64;
    }
    totals.open_amount_minor = totals.expected_amount_minor - totals.paid_amount_minor;
    totals
}

/// Recompute and persist the snapshot for one period
///
/// A scope with no charges produces an all-zero snapshot (except the live
/// active-member count).
pub async fn refresh_snapshot(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    period_type: PeriodType,
    year: i32,
    month: Option<i32>,
) -> Result<KpiSnapshot, BillingError> {
    validate_tenant_id(tenant_id)?;
    let period = PeriodKey::new(period_type, year, month)?;

    let charges = store
        .list_charges(tenant_id, lodge_id, &BillingScope::period(&period))
        .await?;
    let members_active = store
        .count_active_members(tenant_id, lodge_id, &MemberFilter::default())
        .await?;

    let totals = aggregate_charges(&charges, AggregateMode::PerCharge);

    let snapshot = store
        .upsert_snapshot(&KpiSnapshot {
            tenant_id: tenant_id.to_string(),
            lodge_id,
            period_type,
            year,
            month: period.month,
            expected_amount_minor: totals.expected_amount_minor,
            paid_amount_minor: totals.paid_amount_minor,
            open_amount_minor: totals.open_amount_minor,
            members_active,
            paid_members: totals.paid_members,
            delinquent_members: totals.delinquent_members,
            refreshed_at: Utc::now(),
        })
        .await?;

    tracing::debug!(
        tenant_id = %tenant_id,
        lodge_id = %lodge_id,
        period = %period.period_id(),
        charges = charges.len(),
        expected_minor = snapshot.expected_amount_minor,
        paid_minor = snapshot.paid_amount_minor,
        "KPI snapshot refreshed"
    );

    Ok(snapshot)
}

/// Refresh every scope of a year: twelve monthly snapshots, or the annual one
pub async fn refresh_year(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    period_type: PeriodType,
    year: i32,
) -> Result<Vec<KpiSnapshot>, BillingError> {
    let mut snapshots = Vec::new();
    for key in keys_for_year(period_type, year) {
        snapshots
            .push(refresh_snapshot(store, tenant_id, lodge_id, key.period_type, key.year, key.month).await?);
    }
    Ok(snapshots)
}
