//! Billing persistence seam
//!
//! Every billing component talks to storage through [`BillingStore`]. Two
//! implementations ship with the crate:
//!
//! - [`PgBillingStore`]: Postgres via sqlx, uniqueness enforced by indexes
//! - [`InMemoryBillingStore`]: process-local maps with the same uniqueness
//!   rules, for tests and local development without a database
//!
//! Every method is scoped by `tenant_id` and `lodge_id`. No method returns rows
//! belonging to another tenant.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Charge, ChargeSettlement, KpiSnapshot, Lodge, Member, NewCharge, NewPayment, Payment,
    PaymentWithMember,
};
use crate::periods::{PeriodKey, PeriodType};

pub mod inmemory;
pub mod postgres;

pub use inmemory::InMemoryBillingStore;
pub use postgres::PgBillingStore;

/// Postgres SQLSTATE for unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION) =>
            {
                StoreError::UniqueViolation(db_err.constraint().unwrap_or("unknown").to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Active-member selection for roster reads
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    /// Case-insensitive substring match on the member's full name
    pub search: Option<String>,
    pub member_id: Option<Uuid>,
    /// Page size; `None` returns every match
    pub limit: Option<i64>,
    pub offset: i64,
}

/// Charge or payment rows of one period type over a year range.
///
/// `month: None` spans every month of the range (and is the only value an
/// ANNUAL scope ever carries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingScope {
    pub period_type: PeriodType,
    pub from_year: i32,
    pub to_year: i32,
    pub month: Option<i32>,
    /// Restrict to these members; `None` means the whole lodge
    pub member_ids: Option<Vec<Uuid>>,
}

impl BillingScope {
    /// Exactly one billing period
    pub fn period(key: &PeriodKey) -> Self {
        Self {
            period_type: key.period_type,
            from_year: key.year,
            to_year: key.year,
            month: key.month,
            member_ids: None,
        }
    }

    /// Every period of one type within a calendar year
    pub fn year(period_type: PeriodType, year: i32) -> Self {
        Self::years(period_type, year, year)
    }

    pub fn years(period_type: PeriodType, from_year: i32, to_year: i32) -> Self {
        Self {
            period_type,
            from_year,
            to_year,
            month: None,
            member_ids: None,
        }
    }

    pub fn with_members(mut self, member_ids: Vec<Uuid>) -> Self {
        self.member_ids = Some(member_ids);
        self
    }

    /// In-memory equivalent of the SQL scope predicate
    pub fn matches(
        &self,
        period_type: PeriodType,
        year: i32,
        month: Option<i32>,
        member_id: Uuid,
    ) -> bool {
        period_type == self.period_type
            && (self.from_year..=self.to_year).contains(&year)
            && (self.month.is_none() || self.month == month)
            && self
                .member_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&member_id))
    }
}

/// Payment history selection
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub member_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Backend label reported by the health endpoint
    fn backend(&self) -> &'static str;

    // ---- roster (read-only, owned by the lodge administration shell) ----

    async fn find_lodge(&self, tenant_id: &str, lodge_id: Uuid) -> Result<Option<Lodge>, StoreError>;

    async fn find_member(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Member>, StoreError>;

    /// ACTIVE members ordered by full name
    async fn list_active_members(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &MemberFilter,
    ) -> Result<Vec<Member>, StoreError>;

    /// Count of ACTIVE members matching `filter`, ignoring its limit/offset
    async fn count_active_members(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &MemberFilter,
    ) -> Result<i64, StoreError>;

    // ---- periods and charges ----

    /// Insert the billing period row if it does not exist yet
    async fn ensure_period(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        period: &PeriodKey,
    ) -> Result<(), StoreError>;

    /// Bulk insert, silently skipping rows whose
    /// `(member_id, period_type, year, month)` already exists.
    ///
    /// Returns the number of rows actually created.
    async fn insert_charges_skip_existing(&self, charges: &[NewCharge]) -> Result<u64, StoreError>;

    async fn list_charges(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        scope: &BillingScope,
    ) -> Result<Vec<Charge>, StoreError>;

    async fn find_charge(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<Charge>, StoreError>;

    /// OPEN → CANCELED. Returns `None` when the charge is not OPEN (or gone).
    async fn cancel_charge(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        charge_id: Uuid,
    ) -> Result<Option<Charge>, StoreError>;

    // ---- payments ----

    async fn find_confirmed_payment(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<Payment>, StoreError>;

    /// Insert a CONFIRMED payment and apply `settlement` in one atomic write.
    ///
    /// A second CONFIRMED payment for the same member and period fails with
    /// [`StoreError::UniqueViolation`]. The settlement never moves a PAID
    /// charge backwards and never touches a CANCELED one.
    async fn record_payment(
        &self,
        payment: &NewPayment,
        settlement: Option<ChargeSettlement>,
    ) -> Result<Payment, StoreError>;

    /// CONFIRMED payments in scope (bulk read for the status matrix)
    async fn list_confirmed_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        scope: &BillingScope,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Payment history, newest `paid_at` first
    async fn list_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<Vec<PaymentWithMember>, StoreError>;

    async fn count_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<i64, StoreError>;

    // ---- snapshots ----

    /// Insert or fully overwrite the snapshot for its scope
    async fn upsert_snapshot(&self, snapshot: &KpiSnapshot) -> Result<KpiSnapshot, StoreError>;

    async fn find_snapshot(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<KpiSnapshot>, StoreError>;
}
