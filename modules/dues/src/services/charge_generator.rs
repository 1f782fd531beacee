//! Charge Generator
//!
//! Materializes one OPEN charge per ACTIVE member for a billing period.
//! Generation is idempotent: re-running it for the same scope creates nothing,
//! and existing charges (including their status and amount) are never touched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{Charge, ChargeStatus, NewCharge};
use crate::periods::{keys_for_year, PeriodKey, PeriodType};
use crate::store::{BillingStore, MemberFilter};
use crate::validation::{validate_expected_amount, validate_tenant_id, validate_year};

/// Charges created for one period of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodGeneration {
    pub period_id: String,
    pub created: u64,
}

/// Result of a generation run over one or more periods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub period_type: PeriodType,
    pub year: i32,
    pub expected_amount_minor: i64,
    /// In catalog order
    pub periods: Vec<PeriodGeneration>,
    pub created_total: u64,
}

/// Create charges for every ACTIVE member of a lodge in one period
///
/// Returns the number of charges newly created. Members that already hold a
/// charge for the period are skipped silently. A lodge with no active members
/// yields `Ok(0)`.
pub async fn generate_charges(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    period_type: PeriodType,
    year: i32,
    month: Option<i32>,
    expected_amount_minor: i64,
) -> Result<u64, BillingError> {
    validate_tenant_id(tenant_id)?;
    validate_expected_amount(expected_amount_minor)?;
    let period = PeriodKey::new(period_type, year, month)?;

    let members = store
        .list_active_members(tenant_id, lodge_id, &MemberFilter::default())
        .await?;

    if members.is_empty() {
        tracing::info!(
            tenant_id = %tenant_id,
            lodge_id = %lodge_id,
            period = %period.period_id(),
            "No active members, no charges generated"
        );
        return Ok(0);
    }

    store.ensure_period(tenant_id, lodge_id, &period).await?;

    let candidates: Vec<NewCharge> = members
        .iter()
        .map(|member| NewCharge {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            lodge_id,
            member_id: member.id,
            period,
            expected_amount_minor,
        })
        .collect();

    let created = store.insert_charges_skip_existing(&candidates).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        lodge_id = %lodge_id,
        period_type = %period_type,
        period = %period.period_id(),
        active_members = members.len(),
        created,
        "Charges generated"
    );

    Ok(created)
}

/// Explicit amount, or the lodge's configured fee for the period type
pub async fn resolve_amount(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    period_type: PeriodType,
    expected_amount_minor: Option<i64>,
) -> Result<i64, BillingError> {
    match expected_amount_minor {
        Some(amount) => Ok(amount),
        None => Ok(store
            .find_lodge(tenant_id, lodge_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Lodge {}", lodge_id)))?
            .fee_for(period_type)),
    }
}

/// Generate every period of a year: twelve months, or the single annual period
///
/// When `expected_amount_minor` is `None` the lodge's configured fee for the
/// period type is used.
pub async fn generate_year(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    period_type: PeriodType,
    year: i32,
    expected_amount_minor: Option<i64>,
) -> Result<GenerationReport, BillingError> {
    validate_tenant_id(tenant_id)?;
    validate_year(year)?;
    let amount = resolve_amount(store, tenant_id, lodge_id, period_type, expected_amount_minor).await?;

    let mut periods = Vec::new();
    let mut created_total = 0;
    for key in keys_for_year(period_type, year) {
        let created =
            generate_charges(store, tenant_id, lodge_id, key.period_type, key.year, key.month, amount)
                .await?;
        created_total += created;
        periods.push(PeriodGeneration {
            period_id: key.period_id(),
            created,
        });
    }

    Ok(GenerationReport {
        period_type,
        year,
        expected_amount_minor: amount,
        periods,
        created_total,
    })
}

/// Administratively cancel a member's OPEN charge
///
/// PARTIAL and PAID charges carry money and cannot be canceled.
pub async fn cancel_charge(
    store: &dyn BillingStore,
    tenant_id: &str,
    lodge_id: Uuid,
    member_id: Uuid,
    period: &PeriodKey,
) -> Result<Charge, BillingError> {
    validate_tenant_id(tenant_id)?;

    let charge = store
        .find_charge(tenant_id, lodge_id, member_id, period)
        .await?
        .ok_or_else(|| {
            BillingError::NotFound(format!(
                "Charge for member {} in period {}",
                member_id,
                period.period_id()
            ))
        })?;

    if charge.status != ChargeStatus::Open {
        return Err(BillingError::ChargeNotCancelable {
            charge_id: charge.id,
            status: charge.status.as_str().to_string(),
        });
    }

    // Conditional update: a payment may have landed since the read
    let canceled = match store.cancel_charge(tenant_id, lodge_id, charge.id).await? {
        Some(canceled) => canceled,
        None => {
            let current = store
                .find_charge(tenant_id, lodge_id, member_id, period)
                .await?
                .map_or(charge.status, |c| c.status);
            return Err(BillingError::ChargeNotCancelable {
                charge_id: charge.id,
                status: current.as_str().to_string(),
            });
        }
    };

    tracing::info!(
        tenant_id = %tenant_id,
        lodge_id = %lodge_id,
        charge_id = %canceled.id,
        period = %period.period_id(),
        "Charge canceled"
    );

    Ok(canceled)
}
