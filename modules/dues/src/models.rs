//! Billing records shared by the store implementations and services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::periods::{PeriodKey, PeriodType};

// ============================================================================
// ENUMS
// ============================================================================

/// Member lifecycle status, matching database member_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Active,
    Proposed,
    Dormant,
}

/// Charge status, matching database charge_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "charge_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Open,
    Partial,
    Paid,
    Canceled,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Open => "OPEN",
            ChargeStatus::Partial => "PARTIAL",
            ChargeStatus::Paid => "PAID",
            ChargeStatus::Canceled => "CANCELED",
        }
    }

    /// Status after a payment of `amount_minor` lands on a charge of
    /// `expected_minor`. Forward-only: PAID never regresses.
    pub fn settle(self, expected_minor: i64, amount_minor: i64) -> ChargeStatus {
        match self {
            ChargeStatus::Paid | ChargeStatus::Canceled => self,
            ChargeStatus::Open | ChargeStatus::Partial => {
                if amount_minor >= expected_minor {
                    ChargeStatus::Paid
                } else {
                    ChargeStatus::Partial
                }
            }
        }
    }
}

/// Payment status, matching database payment_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Confirmed,
    Pending,
}

/// How the money arrived, matching database payment_method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Pix,
    BankTransfer,
    Cash,
    Boleto,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "PIX",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Boleto => "BOLETO",
        }
    }
}

/// Who receives the dues: monthly dues stay with the lodge, annual dues go
/// to the governing potency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "beneficiary", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Beneficiary {
    Lodge,
    Potency,
}

impl From<PeriodType> for Beneficiary {
    fn from(period_type: PeriodType) -> Self {
        match period_type {
            PeriodType::Monthly => Beneficiary::Lodge,
            PeriodType::Annual => Beneficiary::Potency,
        }
    }
}

// ============================================================================
// ROSTER (owned by the lodge administration shell, read-only here)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Lodge {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub monthly_fee_minor: i64,
    pub annual_fee_minor: i64,
    pub due_day: i32,
}

impl Lodge {
    pub fn fee_for(&self, period_type: PeriodType) -> i64 {
        match period_type {
            PeriodType::Monthly => self.monthly_fee_minor,
            PeriodType::Annual => self.annual_fee_minor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub full_name: String,
    pub status: MemberStatus,
}

// ============================================================================
// BILLING RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Charge {
    pub id: Uuid,
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub member_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    pub month: Option<i32>,
    pub expected_amount_minor: i64,
    pub status: ChargeStatus,
    pub paid_payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Charge {
    pub fn period_key(&self) -> PeriodKey {
        PeriodKey {
            period_type: self.period_type,
            year: self.year,
            month: self.month,
        }
    }
}

/// Candidate row for batch charge generation
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub id: Uuid,
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub member_id: Uuid,
    pub period: PeriodKey,
    pub expected_amount_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub member_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    pub month: Option<i32>,
    pub amount_minor: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub beneficiary: Beneficiary,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn period_key(&self) -> PeriodKey {
        PeriodKey {
            period_type: self.period_type,
            year: self.year,
            month: self.month,
        }
    }
}

/// Payment with the member's display name, for history listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentWithMember {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub payment: Payment,
    pub member_name: String,
}

/// Payment row to insert, plus the charge settlement decided by the ledger
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub member_id: Uuid,
    pub period: PeriodKey,
    pub amount_minor: i64,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

/// Status transition to apply to a charge in the same write as the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeSettlement {
    pub charge_id: Uuid,
    pub status: ChargeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct KpiSnapshot {
    pub tenant_id: String,
    pub lodge_id: Uuid,
    pub period_type: PeriodType,
    pub year: i32,
    pub month: Option<i32>,
    pub expected_amount_minor: i64,
    pub paid_amount_minor: i64,
    pub open_amount_minor: i64,
    pub members_active: i64,
    pub paid_members: i64,
    pub delinquent_members: i64,
    pub refreshed_at: DateTime<Utc>,
}
