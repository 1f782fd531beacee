//! In-memory implementation of the BillingStore trait for testing and development

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BillingScope, BillingStore, MemberFilter, PaymentFilter, StoreError};
use crate::models::{
    Beneficiary, Charge, ChargeSettlement, ChargeStatus, KpiSnapshot, Lodge, Member,
    MemberStatus, NewCharge, NewPayment, Payment, PaymentStatus, PaymentWithMember,
};
use crate::periods::PeriodKey;

/// Constraint name reported on payment conflicts, matching the Postgres schema
const PAYMENT_CONFIRMED_UNIQUE: &str = "payments_confirmed_member_period_key";

#[derive(Default)]
struct State {
    lodges: HashMap<Uuid, Lodge>,
    members: HashMap<Uuid, Member>,
    periods: HashSet<(String, Uuid, PeriodKey)>,
    charges: HashMap<Uuid, Charge>,
    charge_keys: HashSet<(Uuid, PeriodKey)>,
    payments: Vec<Payment>,
    snapshots: HashMap<(String, Uuid, PeriodKey), KpiSnapshot>,
}

/// BillingStore backed by process-local maps
///
/// Applies the same uniqueness rules as the Postgres schema: one charge per
/// member and period, one CONFIRMED payment per member and period. Each trait
/// call counts as one query so tests can assert on round trips.
#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<RwLock<State>>,
    queries: Arc<AtomicUsize>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a lodge (the roster is owned by another service)
    pub async fn insert_lodge(&self, lodge: Lodge) {
        self.state.write().await.lodges.insert(lodge.id, lodge);
    }

    /// Seed a member
    pub async fn insert_member(&self, member: Member) {
        self.state.write().await.members.insert(member.id, member);
    }

    pub async fn set_member_status(&self, member_id: Uuid, status: MemberStatus) {
        if let Some(member) = self.state.write().await.members.get_mut(&member_id) {
            member.status = status;
        }
    }

    /// Number of store calls made since creation or the last reset
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

fn member_matches(member: &Member, tenant_id: &str, lodge_id: Uuid, filter: &MemberFilter) -> bool {
    member.tenant_id == tenant_id
        && member.lodge_id == lodge_id
        && member.status == MemberStatus::Active
        && filter.member_id.map_or(true, |id| member.id == id)
        && filter.search.as_ref().map_or(true, |needle| {
            member
                .full_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        })
}

fn payment_matches(payment: &Payment, tenant_id: &str, lodge_id: Uuid, filter: &PaymentFilter) -> bool {
    payment.tenant_id == tenant_id
        && payment.lodge_id == lodge_id
        && filter.year.map_or(true, |y| payment.year == y)
        && filter.month.map_or(true, |m| payment.month == Some(m))
        && filter.member_id.map_or(true, |id| payment.member_id == id)
}

fn paginate<T>(rows: Vec<T>, limit: Option<i64>, offset: i64) -> Vec<T> {
    let skip = offset.max(0) as usize;
    match limit {
        Some(limit) => rows.into_iter().skip(skip).take(limit.max(0) as usize).collect(),
        None => rows.into_iter().skip(skip).collect(),
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    fn backend(&self) -> &'static str {
        "inmemory"
    }

    async fn find_lodge(&self, tenant_id: &str, lodge_id: Uuid) -> Result<Option<Lodge>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .lodges
            .get(&lodge_id)
            .filter(|l| l.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_member(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Member>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .members
            .get(&member_id)
            .filter(|m| m.tenant_id == tenant_id && m.lodge_id == lodge_id)
            .cloned())
    }

    async fn list_active_members(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &MemberFilter,
    ) -> Result<Vec<Member>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        let mut members: Vec<Member> = state
            .members
            .values()
            .filter(|m| member_matches(m, tenant_id, lodge_id, filter))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        Ok(paginate(members, filter.limit, filter.offset))
    }

    async fn count_active_members(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &MemberFilter,
    ) -> Result<i64, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .filter(|m| member_matches(m, tenant_id, lodge_id, filter))
            .count() as i64)
    }

    async fn ensure_period(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        period: &PeriodKey,
    ) -> Result<(), StoreError> {
        self.count_query();
        self.state
            .write()
            .await
            .periods
            .insert((tenant_id.to_string(), lodge_id, *period));
        Ok(())
    }

    async fn insert_charges_skip_existing(&self, charges: &[NewCharge]) -> Result<u64, StoreError> {
        self.count_query();
        // Key check and insert under one write lock, like ON CONFLICT DO NOTHING
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut created = 0;
        for candidate in charges {
            if !state.charge_keys.insert((candidate.member_id, candidate.period)) {
                continue;
            }
            state.charges.insert(
                candidate.id,
                Charge {
                    id: candidate.id,
                    tenant_id: candidate.tenant_id.clone(),
                    lodge_id: candidate.lodge_id,
                    member_id: candidate.member_id,
                    period_type: candidate.period.period_type,
                    year: candidate.period.year,
                    month: candidate.period.month,
                    expected_amount_minor: candidate.expected_amount_minor,
                    status: ChargeStatus::Open,
                    paid_payment_id: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            created += 1;
        }
        Ok(created)
    }

    async fn list_charges(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        scope: &BillingScope,
    ) -> Result<Vec<Charge>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        let mut charges: Vec<Charge> = state
            .charges
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.lodge_id == lodge_id
                    && scope.matches(c.period_type, c.year, c.month, c.member_id)
            })
            .cloned()
            .collect();
        charges.sort_by_key(|c| (c.year, c.month, c.member_id));
        Ok(charges)
    }

    async fn find_charge(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<Charge>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .charges
            .values()
            .find(|c| {
                c.tenant_id == tenant_id
                    && c.lodge_id == lodge_id
                    && c.member_id == member_id
                    && c.period_key() == *period
            })
            .cloned())
    }

    async fn cancel_charge(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        charge_id: Uuid,
    ) -> Result<Option<Charge>, StoreError> {
        self.count_query();
        let mut state = self.state.write().await;
        match state.charges.get_mut(&charge_id) {
            Some(charge)
                if charge.tenant_id == tenant_id
                    && charge.lodge_id == lodge_id
                    && charge.status == ChargeStatus::Open =>
            {
                charge.status = ChargeStatus::Canceled;
                charge.updated_at = Utc::now();
                Ok(Some(charge.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_confirmed_payment(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<Payment>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .find(|p| {
                p.tenant_id == tenant_id
                    && p.lodge_id == lodge_id
                    && p.member_id == member_id
                    && p.status == PaymentStatus::Confirmed
                    && p.period_key() == *period
            })
            .cloned())
    }

    async fn record_payment(
        &self,
        payment: &NewPayment,
        settlement: Option<ChargeSettlement>,
    ) -> Result<Payment, StoreError> {
        self.count_query();
        let mut state = self.state.write().await;

        let duplicate = state.payments.iter().any(|p| {
            p.member_id == payment.member_id
                && p.status == PaymentStatus::Confirmed
                && p.period_key() == payment.period
        });
        if duplicate {
            return Err(StoreError::UniqueViolation(PAYMENT_CONFIRMED_UNIQUE.to_string()));
        }

        let now = Utc::now();
        let recorded = Payment {
            id: payment.id,
            tenant_id: payment.tenant_id.clone(),
            lodge_id: payment.lodge_id,
            member_id: payment.member_id,
            period_type: payment.period.period_type,
            year: payment.period.year,
            month: payment.period.month,
            amount_minor: payment.amount_minor,
            method: payment.method,
            status: PaymentStatus::Confirmed,
            beneficiary: Beneficiary::from(payment.period.period_type),
            paid_at: payment.paid_at,
            reference: payment.reference.clone(),
            notes: payment.notes.clone(),
            recorded_by: payment.recorded_by.clone(),
            created_at: now,
        };

        if let Some(settlement) = settlement {
            if let Some(charge) = state.charges.get_mut(&settlement.charge_id) {
                let settles = charge.tenant_id == payment.tenant_id
                    && charge.lodge_id == payment.lodge_id
                    && !matches!(charge.status, ChargeStatus::Paid | ChargeStatus::Canceled);
                if settles {
                    charge.status = settlement.status;
                    if settlement.status == ChargeStatus::Paid {
                        charge.paid_payment_id = Some(recorded.id);
                    }
                    charge.updated_at = now;
                }
            }
        }

        state.payments.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_confirmed_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        scope: &BillingScope,
    ) -> Result<Vec<Payment>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| {
                p.tenant_id == tenant_id
                    && p.lodge_id == lodge_id
                    && p.status == PaymentStatus::Confirmed
                    && scope.matches(p.period_type, p.year, p.month, p.member_id)
            })
            .cloned()
            .collect())
    }

    async fn list_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<Vec<PaymentWithMember>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        let mut rows: Vec<PaymentWithMember> = state
            .payments
            .iter()
            .filter(|p| payment_matches(p, tenant_id, lodge_id, filter))
            .map(|p| PaymentWithMember {
                payment: p.clone(),
                member_name: state
                    .members
                    .get(&p.member_id)
                    .map(|m| m.full_name.clone())
                    .unwrap_or_default(),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.payment
                .paid_at
                .cmp(&a.payment.paid_at)
                .then(b.payment.created_at.cmp(&a.payment.created_at))
        });
        Ok(paginate(rows, filter.limit, filter.offset))
    }

    async fn count_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<i64, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| payment_matches(p, tenant_id, lodge_id, filter))
            .count() as i64)
    }

    async fn upsert_snapshot(&self, snapshot: &KpiSnapshot) -> Result<KpiSnapshot, StoreError> {
        self.count_query();
        let key = PeriodKey {
            period_type: snapshot.period_type,
            year: snapshot.year,
            month: snapshot.month,
        };
        self.state.write().await.snapshots.insert(
            (snapshot.tenant_id.clone(), snapshot.lodge_id, key),
            snapshot.clone(),
        );
        Ok(snapshot.clone())
    }

    async fn find_snapshot(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<KpiSnapshot>, StoreError> {
        self.count_query();
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .get(&(tenant_id.to_string(), lodge_id, *period))
            .cloned())
    }
}
