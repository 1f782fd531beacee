//! Payment Ledger
//!
//! Records manually confirmed payments and reconciles them against charges.
//! At most one CONFIRMED payment may exist per member and period: a pre-check
//! catches the common case, and the store's unique index catches the race.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{ChargeSettlement, ChargeStatus, NewPayment, Payment, PaymentMethod};
use crate::periods::{PeriodKey, PeriodType};
use crate::store::{BillingStore, StoreError};
use crate::validation::{validate_payment_amount, validate_tenant_id};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub member_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    #[serde(default)]
    pub month: Option<i32>,
    pub amount_minor: i64,
    pub method: PaymentMethod,
    /// Defaults to the time of recording
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedPayment {
    pub payment: Payment,
    /// Charge status after reconciliation; `None` when no charge exists
    pub charge_status: Option<ChargeStatus>,
    /// True when the payment was accepted without a matching charge
    pub unmatched: bool,
}

pub async fn record_payment(
    store: &dyn BillingStore,
    request: RecordPaymentRequest,
) -> Result<RecordedPayment, BillingError> {
    validate_tenant_id(&request.tenant_id)?;
    validate_payment_amount(request.amount_minor)?;
    let period = PeriodKey::new(request.period_type, request.year, request.month)?;
    let tenant_id = request.tenant_id.as_str();

    store
        .find_member(tenant_id, request.lodge_id, request.member_id)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Member {}", request.member_id)))?;

    if store
        .find_confirmed_payment(tenant_id, request.lodge_id, request.member_id, &period)
        .await?
        .is_some()
    {
        return Err(duplicate(request.member_id, &period));
    }

    let charge = store
        .find_charge(tenant_id, request.lodge_id, request.member_id, &period)
        .await?;

    let settlement = match &charge {
        Some(charge) if charge.status == ChargeStatus::Canceled => {
            return Err(BillingError::ChargeCanceled(period.period_id()));
        }
        Some(charge) => Some(ChargeSettlement {
            charge_id: charge.id,
            status: charge
                .status
                .settle(charge.expected_amount_minor, request.amount_minor),
        }),
        None => {
            tracing::warn!(
                tenant_id = %tenant_id,
                lodge_id = %request.lodge_id,
                member_id = %request.member_id,
                period = %period.period_id(),
                "Payment recorded without a matching charge"
            );
            None
        }
    };

    let new_payment = NewPayment {
        id: Uuid::new_v4(),
        tenant_id: request.tenant_id.clone(),
        lodge_id: request.lodge_id,
        member_id: request.member_id,
        period,
        amount_minor: request.amount_minor,
        method: request.method,
        paid_at: request.paid_at.unwrap_or_else(Utc::now),
        reference: request.reference,
        notes: request.notes,
        recorded_by: request.recorded_by,
    };

    let payment = match store.record_payment(&new_payment, settlement).await {
        Ok(payment) => payment,
        Err(StoreError::UniqueViolation(constraint)) => {
            tracing::info!(
                tenant_id = %tenant_id,
                member_id = %request.member_id,
                period = %period.period_id(),
                constraint = %constraint,
                "Concurrent duplicate payment rejected by unique index"
            );
            return Err(duplicate(request.member_id, &period));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        tenant_id = %tenant_id,
        lodge_id = %payment.lodge_id,
        member_id = %payment.member_id,
        payment_id = %payment.id,
        period = %period.period_id(),
        amount_minor = payment.amount_minor,
        charge_status = ?settlement.map(|s| s.status),
        "Payment recorded"
    );

    Ok(RecordedPayment {
        payment,
        charge_status: settlement.map(|s| s.status),
        unmatched: charge.is_none(),
    })
}

fn duplicate(member_id: Uuid, period: &PeriodKey) -> BillingError {
    BillingError::DuplicatePayment {
        member_id,
        period_id: period.period_id(),
    }
}
