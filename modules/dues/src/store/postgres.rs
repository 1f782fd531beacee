//! Postgres implementation of the BillingStore trait
//!
//! Uniqueness is enforced by the schema, not by read-then-write:
//! - `dues_charges_member_period_key` absorbs repeated charge generation
//!   through `ON CONFLICT DO NOTHING`
//! - `payments_confirmed_member_period_key` (partial, CONFIRMED only) turns a
//!   losing concurrent payment insert into [`StoreError::UniqueViolation`]
//! - `kpi_snapshots_scope_key` makes snapshot writes a full-row upsert

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{BillingScope, BillingStore, MemberFilter, PaymentFilter, StoreError};
use crate::models::{
    Beneficiary, Charge, ChargeSettlement, KpiSnapshot, Lodge, Member, NewCharge, NewPayment,
    Payment, PaymentWithMember,
};
use crate::periods::PeriodKey;

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Search term as an ILIKE pattern, with LIKE wildcards escaped
fn like_pattern(search: &Option<String>) -> Option<String> {
    search.as_ref().map(|s| {
        let escaped = s
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{}%", escaped)
    })
}

/// Insert the payment row inside an open transaction
async fn tx_insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &NewPayment,
) -> Result<Payment, StoreError> {
    let row = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (
            id, tenant_id, lodge_id, member_id,
            period_type, year, month,
            amount_minor, method, status, beneficiary,
            paid_at, reference, notes, recorded_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'CONFIRMED', $10, $11, $12, $13, $14)
        RETURNING
            id, tenant_id, lodge_id, member_id,
            period_type, year, month,
            amount_minor, method, status, beneficiary,
            paid_at, reference, notes, recorded_by, created_at
        "#,
    )
    .bind(payment.id)
    .bind(&payment.tenant_id)
    .bind(payment.lodge_id)
    .bind(payment.member_id)
    .bind(payment.period.period_type)
    .bind(payment.period.year)
    .bind(payment.period.month)
    .bind(payment.amount_minor)
    .bind(payment.method)
    .bind(Beneficiary::from(payment.period.period_type))
    .bind(payment.paid_at)
    .bind(&payment.reference)
    .bind(&payment.notes)
    .bind(&payment.recorded_by)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

/// Move an OPEN/PARTIAL charge forward; PAID and CANCELED rows are left alone
async fn tx_settle_charge(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    lodge_id: Uuid,
    settlement: ChargeSettlement,
    payment_id: Uuid,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE dues_charges
        SET status = $3,
            paid_payment_id = CASE WHEN $3 = 'PAID'::charge_status THEN $4 ELSE paid_payment_id END,
            updated_at = NOW()
        WHERE id = $1
          AND tenant_id = $2
          AND lodge_id = $5
          AND status IN ('OPEN', 'PARTIAL')
        "#,
    )
    .bind(settlement.charge_id)
    .bind(tenant_id)
    .bind(settlement.status)
    .bind(payment_id)
    .bind(lodge_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl BillingStore for PgBillingStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_lodge(&self, tenant_id: &str, lodge_id: Uuid) -> Result<Option<Lodge>, StoreError> {
        let lodge = sqlx::query_as::<_, Lodge>(
            r#"
            SELECT id, tenant_id, name, monthly_fee_minor, annual_fee_minor, due_day
            FROM lodges
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lodge)
    }

    async fn find_member(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Member>, StoreError> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT id, tenant_id, lodge_id, full_name, status
            FROM members
            WHERE tenant_id = $1 AND lodge_id = $2 AND id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    async fn list_active_members(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &MemberFilter,
    ) -> Result<Vec<Member>, StoreError> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT id, tenant_id, lodge_id, full_name, status
            FROM members
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND status = 'ACTIVE'
              AND ($3::TEXT IS NULL OR full_name ILIKE $3)
              AND ($4::UUID IS NULL OR id = $4)
            ORDER BY full_name, id
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(like_pattern(&filter.search))
        .bind(filter.member_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn count_active_members(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &MemberFilter,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM members
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND status = 'ACTIVE'
              AND ($3::TEXT IS NULL OR full_name ILIKE $3)
              AND ($4::UUID IS NULL OR id = $4)
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(like_pattern(&filter.search))
        .bind(filter.member_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn ensure_period(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        period: &PeriodKey,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO billing_periods (tenant_id, lodge_id, period_type, year, month)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT billing_periods_scope_key DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(period.period_type)
        .bind(period.year)
        .bind(period.month)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_charges_skip_existing(&self, charges: &[NewCharge]) -> Result<u64, StoreError> {
        if charges.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = charges.iter().map(|c| c.id).collect();
        let tenant_ids: Vec<String> = charges.iter().map(|c| c.tenant_id.clone()).collect();
        let lodge_ids: Vec<Uuid> = charges.iter().map(|c| c.lodge_id).collect();
        let member_ids: Vec<Uuid> = charges.iter().map(|c| c.member_id).collect();
        let period_types: Vec<String> = charges
            .iter()
            .map(|c| c.period.period_type.as_str().to_string())
            .collect();
        let years: Vec<i32> = charges.iter().map(|c| c.period.year).collect();
        let months: Vec<Option<i32>> = charges.iter().map(|c| c.period.month).collect();
        let amounts: Vec<i64> = charges.iter().map(|c| c.expected_amount_minor).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO dues_charges (
                id, tenant_id, lodge_id, member_id,
                period_type, year, month, expected_amount_minor, status
            )
            SELECT c.id, c.tenant_id, c.lodge_id, c.member_id,
                   c.period_type::period_type, c.year, c.month, c.expected_amount_minor, 'OPEN'
            FROM UNNEST(
                $1::UUID[], $2::TEXT[], $3::UUID[], $4::UUID[],
                $5::TEXT[], $6::INTEGER[], $7::INTEGER[], $8::BIGINT[]
            ) AS c(id, tenant_id, lodge_id, member_id, period_type, year, month, expected_amount_minor)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&tenant_ids)
        .bind(&lodge_ids)
        .bind(&member_ids)
        .bind(&period_types)
        .bind(&years)
        .bind(&months)
        .bind(&amounts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_charges(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        scope: &BillingScope,
    ) -> Result<Vec<Charge>, StoreError> {
        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT id, tenant_id, lodge_id, member_id, period_type, year, month,
                   expected_amount_minor, status, paid_payment_id, created_at, updated_at
            FROM dues_charges
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND period_type = $3
              AND year BETWEEN $4 AND $5
              AND ($6::INTEGER IS NULL OR month = $6)
              AND ($7::UUID[] IS NULL OR member_id = ANY($7))
            ORDER BY year, month NULLS FIRST, member_id
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(scope.period_type)
        .bind(scope.from_year)
        .bind(scope.to_year)
        .bind(scope.month)
        .bind(&scope.member_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn find_charge(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<Charge>, StoreError> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            SELECT id, tenant_id, lodge_id, member_id, period_type, year, month,
                   expected_amount_minor, status, paid_payment_id, created_at, updated_at
            FROM dues_charges
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND member_id = $3
              AND period_type = $4
              AND year = $5
              AND month IS NOT DISTINCT FROM $6
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(member_id)
        .bind(period.period_type)
        .bind(period.year)
        .bind(period.month)
        .fetch_optional(&self.pool)
        .await?;

        Ok(charge)
    }

    async fn cancel_charge(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        charge_id: Uuid,
    ) -> Result<Option<Charge>, StoreError> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE dues_charges
            SET status = 'CANCELED', updated_at = NOW()
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND id = $3
              AND status = 'OPEN'
            RETURNING id, tenant_id, lodge_id, member_id, period_type, year, month,
                      expected_amount_minor, status, paid_payment_id, created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(charge)
    }

    async fn find_confirmed_payment(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        member_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, tenant_id, lodge_id, member_id, period_type, year, month,
                   amount_minor, method, status, beneficiary,
                   paid_at, reference, notes, recorded_by, created_at
            FROM payments
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND member_id = $3
              AND period_type = $4
              AND year = $5
              AND month IS NOT DISTINCT FROM $6
              AND status = 'CONFIRMED'
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(member_id)
        .bind(period.period_type)
        .bind(period.year)
        .bind(period.month)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn record_payment(
        &self,
        payment: &NewPayment,
        settlement: Option<ChargeSettlement>,
    ) -> Result<Payment, StoreError> {
        let mut tx = self.pool.begin().await?;

        let recorded = tx_insert_payment(&mut tx, payment).await?;

        if let Some(settlement) = settlement {
            let updated = tx_settle_charge(
                &mut tx,
                &payment.tenant_id,
                payment.lodge_id,
                settlement,
                recorded.id,
            )
            .await?;
            if updated == 0 {
                tracing::debug!(
                    charge_id = %settlement.charge_id,
                    "Charge already settled or canceled, status left unchanged"
                );
            }
        }

        tx.commit().await?;

        Ok(recorded)
    }

    async fn list_confirmed_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        scope: &BillingScope,
    ) -> Result<Vec<Payment>, StoreError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, tenant_id, lodge_id, member_id, period_type, year, month,
                   amount_minor, method, status, beneficiary,
                   paid_at, reference, notes, recorded_by, created_at
            FROM payments
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND status = 'CONFIRMED'
              AND period_type = $3
              AND year BETWEEN $4 AND $5
              AND ($6::INTEGER IS NULL OR month = $6)
              AND ($7::UUID[] IS NULL OR member_id = ANY($7))
            ORDER BY paid_at
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(scope.period_type)
        .bind(scope.from_year)
        .bind(scope.to_year)
        .bind(scope.month)
        .bind(&scope.member_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    async fn list_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<Vec<PaymentWithMember>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentWithMember>(
            r#"
            SELECT p.id, p.tenant_id, p.lodge_id, p.member_id, p.period_type, p.year, p.month,
                   p.amount_minor, p.method, p.status, p.beneficiary,
                   p.paid_at, p.reference, p.notes, p.recorded_by, p.created_at,
                   COALESCE(m.full_name, '') AS member_name
            FROM payments p
            LEFT JOIN members m ON m.id = p.member_id AND m.tenant_id = p.tenant_id
            WHERE p.tenant_id = $1
              AND p.lodge_id = $2
              AND ($3::INTEGER IS NULL OR p.year = $3)
              AND ($4::INTEGER IS NULL OR p.month = $4)
              AND ($5::UUID IS NULL OR p.member_id = $5)
            ORDER BY p.paid_at DESC, p.created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(filter.year)
        .bind(filter.month)
        .bind(filter.member_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_payments(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        filter: &PaymentFilter,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM payments
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND ($3::INTEGER IS NULL OR year = $3)
              AND ($4::INTEGER IS NULL OR month = $4)
              AND ($5::UUID IS NULL OR member_id = $5)
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(filter.year)
        .bind(filter.month)
        .bind(filter.member_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn upsert_snapshot(&self, snapshot: &KpiSnapshot) -> Result<KpiSnapshot, StoreError> {
        let row = sqlx::query_as::<_, KpiSnapshot>(
            r#"
            INSERT INTO kpi_snapshots (
                tenant_id, lodge_id, period_type, year, month,
                expected_amount_minor, paid_amount_minor, open_amount_minor,
                members_active, paid_members, delinquent_members, refreshed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT ON CONSTRAINT kpi_snapshots_scope_key
            DO UPDATE SET
                expected_amount_minor = EXCLUDED.expected_amount_minor,
                paid_amount_minor = EXCLUDED.paid_amount_minor,
                open_amount_minor = EXCLUDED.open_amount_minor,
                members_active = EXCLUDED.members_active,
                paid_members = EXCLUDED.paid_members,
                delinquent_members = EXCLUDED.delinquent_members,
                refreshed_at = EXCLUDED.refreshed_at
            RETURNING
                tenant_id, lodge_id, period_type, year, month,
                expected_amount_minor, paid_amount_minor, open_amount_minor,
                members_active, paid_members, delinquent_members, refreshed_at
            "#,
        )
        .bind(&snapshot.tenant_id)
        .bind(snapshot.lodge_id)
        .bind(snapshot.period_type)
        .bind(snapshot.year)
        .bind(snapshot.month)
        .bind(snapshot.expected_amount_minor)
        .bind(snapshot.paid_amount_minor)
        .bind(snapshot.open_amount_minor)
        .bind(snapshot.members_active)
        .bind(snapshot.paid_members)
        .bind(snapshot.delinquent_members)
        .bind(snapshot.refreshed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_snapshot(
        &self,
        tenant_id: &str,
        lodge_id: Uuid,
        period: &PeriodKey,
    ) -> Result<Option<KpiSnapshot>, StoreError> {
        let snapshot = sqlx::query_as::<_, KpiSnapshot>(
            r#"
            SELECT tenant_id, lodge_id, period_type, year, month,
                   expected_amount_minor, paid_amount_minor, open_amount_minor,
                   members_active, paid_members, delinquent_members, refreshed_at
            FROM kpi_snapshots
            WHERE tenant_id = $1
              AND lodge_id = $2
              AND period_type = $3
              AND year = $4
              AND month IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(period.period_type)
        .bind(period.year)
        .bind(period.month)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }
}
