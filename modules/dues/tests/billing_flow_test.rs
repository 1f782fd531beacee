//! Billing flow tests: charge generation, payment recording, cancellation and
//! KPI snapshots over the in-memory store.

mod common;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use common::{fixture, seed_lodge, FEE, OTHER_TENANT, TENANT};
use dues_rs::models::{ChargeStatus, PaymentMethod};
use dues_rs::periods::{PeriodKey, PeriodType};
use dues_rs::services::charge_generator::{cancel_charge, generate_charges, generate_year};
use dues_rs::services::payment_ledger::{record_payment, RecordPaymentRequest};
use dues_rs::services::snapshot_aggregator::{
    aggregate_charges, refresh_snapshot, refresh_year, AggregateMode,
};
use dues_rs::services::summary_reader::{get_summary, DATA_SOURCE_COMPUTED, DATA_SOURCE_SNAPSHOT};
use dues_rs::store::BillingScope;
use dues_rs::validation::ValidationError;
use dues_rs::{BillingError, BillingStore};

fn payment(lodge_id: Uuid, member_id: Uuid, month: i32, amount_minor: i64) -> RecordPaymentRequest {
    RecordPaymentRequest {
        tenant_id: TENANT.to_string(),
        lodge_id,
        member_id,
        period_type: PeriodType::Monthly,
        year: 2025,
        month: Some(month),
        amount_minor,
        method: PaymentMethod::Pix,
        paid_at: None,
        reference: None,
        notes: None,
        recorded_by: Some("treasurer".to_string()),
    }
}

#[tokio::test]
async fn test_hundred_member_lodge_month_cycle() {
    let f = fixture(100).await;

    let created = generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(1), FEE)
        .await
        .unwrap();
    assert_eq!(created, 100);

    // Regenerating the same period creates nothing
    let created = generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(1), FEE)
        .await
        .unwrap();
    assert_eq!(created, 0);

    let recorded = record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 1, FEE))
        .await
        .unwrap();
    assert_eq!(recorded.charge_status, Some(ChargeStatus::Paid));
    assert!(!recorded.unmatched);

    let snapshot = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(1))
        .await
        .unwrap();
    assert_eq!(snapshot.expected_amount_minor, 100 * FEE);
    assert_eq!(snapshot.paid_amount_minor, FEE);
    assert_eq!(snapshot.open_amount_minor, 99 * FEE);
    assert_eq!(snapshot.members_active, 100);
    assert_eq!(snapshot.paid_members, 1);
    assert_eq!(snapshot.delinquent_members, 99);

    let err = record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 1, FEE))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::DuplicatePayment { .. }), "got {:?}", err);
    assert_eq!(err.code(), "DUPLICATE_PAYMENT");
}

#[tokio::test]
async fn test_paid_charge_links_payment() {
    let f = fixture(1).await;
    let member_id = f.member_ids[0];
    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(2), FEE)
        .await
        .unwrap();

    let recorded = record_payment(&f.store, payment(f.lodge_id, member_id, 2, FEE + 500))
        .await
        .unwrap();

    let charge = f
        .store
        .find_charge(TENANT, f.lodge_id, member_id, &PeriodKey::monthly(2025, 2).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(charge.status, ChargeStatus::Paid);
    assert_eq!(charge.paid_payment_id, Some(recorded.payment.id));
}

#[tokio::test]
async fn test_underpayment_leaves_charge_partial() {
    let f = fixture(2).await;
    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(3), FEE)
        .await
        .unwrap();

    let recorded = record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 3, 5000))
        .await
        .unwrap();
    assert_eq!(recorded.charge_status, Some(ChargeStatus::Partial));

    // PARTIAL counts as neither paid nor delinquent; its amount stays open
    let snapshot = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(3))
        .await
        .unwrap();
    assert_eq!(snapshot.paid_amount_minor, 0);
    assert_eq!(snapshot.open_amount_minor, 2 * FEE);
    assert_eq!(snapshot.paid_members, 0);
    assert_eq!(snapshot.delinquent_members, 1);
}

#[tokio::test]
async fn test_payment_without_charge_is_unmatched() {
    let f = fixture(1).await;

    let recorded = record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 4, FEE))
        .await
        .unwrap();
    assert!(recorded.unmatched);
    assert_eq!(recorded.charge_status, None);

    // Generating afterwards still creates the charge
    let created = generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(4), FEE)
        .await
        .unwrap();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_payment_rejections() {
    let f = fixture(1).await;

    let err = record_payment(&f.store, payment(f.lodge_id, Uuid::new_v4(), 1, FEE))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));

    let err = record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::Validation(ValidationError::NonPositivePaymentAmount(0))
    ));

    let mut request = payment(f.lodge_id, f.member_ids[0], 1, FEE);
    request.month = None;
    let err = record_payment(&f.store, request).await.unwrap_err();
    assert!(matches!(err, BillingError::Validation(ValidationError::MissingMonth)));

    let mut request = payment(f.lodge_id, f.member_ids[0], 1, FEE);
    request.tenant_id = String::new();
    let err = record_payment(&f.store, request).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_cancel_open_charge_blocks_payment() {
    let f = fixture(2).await;
    let period = PeriodKey::monthly(2025, 5).unwrap();
    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(5), FEE)
        .await
        .unwrap();

    let canceled = cancel_charge(&f.store, TENANT, f.lodge_id, f.member_ids[0], &period)
        .await
        .unwrap();
    assert_eq!(canceled.status, ChargeStatus::Canceled);

    let err = record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 5, FEE))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::ChargeCanceled(_)));

    // Expected still sums every charge; the canceled amount stays open
    let charges = f
        .store
        .list_charges(TENANT, f.lodge_id, &BillingScope::period(&period))
        .await
        .unwrap();
    let sum_of_charges: i64 = charges.iter().map(|c| c.expected_amount_minor).sum();
    let snapshot = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(5))
        .await
        .unwrap();
    assert_eq!(sum_of_charges, 2 * FEE);
    assert_eq!(snapshot.expected_amount_minor, sum_of_charges);
    assert_eq!(snapshot.paid_amount_minor, 0);
    assert_eq!(
        snapshot.open_amount_minor,
        snapshot.expected_amount_minor - snapshot.paid_amount_minor
    );
    assert_eq!(snapshot.paid_members, 0);
    assert_eq!(snapshot.delinquent_members, 1);

    // Regenerating does not resurrect the canceled charge
    let created = generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(5), FEE)
        .await
        .unwrap();
    assert_eq!(created, 0);
}

#[tokio::test]
async fn test_cancel_rejects_settled_and_missing_charges() {
    let f = fixture(1).await;
    let member_id = f.member_ids[0];
    let period = PeriodKey::monthly(2025, 6).unwrap();

    let err = cancel_charge(&f.store, TENANT, f.lodge_id, member_id, &period)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));

    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(6), FEE)
        .await
        .unwrap();
    record_payment(&f.store, payment(f.lodge_id, member_id, 6, FEE))
        .await
        .unwrap();

    let err = cancel_charge(&f.store, TENANT, f.lodge_id, member_id, &period)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, BillingError::ChargeNotCancelable { status, .. } if status == "PAID"),
        "got {:?}",
        err
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_payments() {
    let f = fixture(1).await;
    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(7), FEE)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 7, FEE)),
        record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 7, FEE)),
    );

    let results = [first, second];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(BillingError::DuplicatePayment { .. })))
        .count();
    assert_eq!((ok, duplicates), (1, 1));

    let payments = f
        .store
        .list_confirmed_payments(
            TENANT,
            f.lodge_id,
            &BillingScope::period(&PeriodKey::monthly(2025, 7).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
}

#[tokio::test]
async fn test_generate_year_and_lodge_fee_default() {
    let f = fixture(3).await;

    let report = generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, None)
        .await
        .unwrap();
    assert_eq!(report.expected_amount_minor, FEE);
    assert_eq!(report.periods.len(), 12);
    assert_eq!(report.created_total, 36);
    assert_eq!(report.periods[0].period_id, "2025-01");

    let report = generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025, None)
        .await
        .unwrap();
    assert_eq!(report.expected_amount_minor, FEE * 12);
    assert_eq!(report.created_total, 3);

    let again = generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(9000))
        .await
        .unwrap();
    assert_eq!(again.created_total, 0);
}

#[tokio::test]
async fn test_generation_with_no_active_members() {
    let f = fixture(0).await;
    let created = generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025, None, FEE)
        .await
        .unwrap();
    assert_eq!(created, 0);

    let err = generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025, Some(1), FEE)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::Validation(ValidationError::UnexpectedMonth(1))
    ));

    let err = generate_year(&f.store, TENANT, Uuid::new_v4(), PeriodType::Monthly, 2025, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn test_monthly_summary_counts_distinct_members() {
    let f = fixture(3).await;
    generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, None)
        .await
        .unwrap();
    record_payment(&f.store, payment(f.lodge_id, f.member_ids[0], 1, FEE))
        .await
        .unwrap();

    let summary = get_summary(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025)
        .await
        .unwrap();
    assert_eq!(summary.data_source, DATA_SOURCE_COMPUTED);
    assert_eq!(summary.expected_amount_minor, 36 * FEE);
    assert_eq!(summary.paid_amount_minor, FEE);
    assert_eq!(summary.open_amount_minor, 35 * FEE);
    assert_eq!(summary.paid_members, 1);
    assert_eq!(summary.delinquent_members, 3);
    assert_eq!(summary.members_active, 3);
}

#[tokio::test]
async fn test_monthly_summary_matches_per_month_aggregates() {
    let f = fixture(4).await;
    let [a, b, c, d] = [f.member_ids[0], f.member_ids[1], f.member_ids[2], f.member_ids[3]];
    generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, None)
        .await
        .unwrap();

    record_payment(&f.store, payment(f.lodge_id, a, 1, FEE)).await.unwrap();
    record_payment(&f.store, payment(f.lodge_id, b, 1, 4000)).await.unwrap();
    record_payment(&f.store, payment(f.lodge_id, d, 3, FEE)).await.unwrap();
    cancel_charge(&f.store, TENANT, f.lodge_id, c, &PeriodKey::monthly(2025, 2).unwrap())
        .await
        .unwrap();

    let stale = refresh_year(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025)
        .await
        .unwrap();
    assert_eq!(stale.len(), 12);

    // Changes after the refresh leave every stored monthly snapshot stale
    record_payment(&f.store, payment(f.lodge_id, a, 4, FEE)).await.unwrap();
    record_payment(&f.store, payment(f.lodge_id, c, 7, 2500)).await.unwrap();
    cancel_charge(&f.store, TENANT, f.lodge_id, b, &PeriodKey::monthly(2025, 5).unwrap())
        .await
        .unwrap();

    let mut expected = 0;
    let mut paid = 0;
    let mut open = 0;
    for month in 1..=12 {
        let charges = f
            .store
            .list_charges(
                TENANT,
                f.lodge_id,
                &BillingScope::period(&PeriodKey::monthly(2025, month).unwrap()),
            )
            .await
            .unwrap();
        let totals = aggregate_charges(&charges, AggregateMode::PerCharge);
        expected += totals.expected_amount_minor;
        paid += totals.paid_amount_minor;
        open += totals.open_amount_minor;
    }

    let summary = get_summary(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025)
        .await
        .unwrap();
    assert_eq!(summary.data_source, DATA_SOURCE_COMPUTED);
    assert_eq!(summary.expected_amount_minor, expected);
    assert_eq!(summary.paid_amount_minor, paid);
    assert_eq!(summary.open_amount_minor, open);
    assert_eq!((expected, paid), (48 * FEE, 3 * FEE));

    let stale_paid: i64 = stale.iter().map(|s| s.paid_amount_minor).sum();
    assert_eq!(stale_paid, 2 * FEE);
    assert_ne!(summary.paid_amount_minor, stale_paid);
}

#[tokio::test]
async fn test_annual_summary_prefers_snapshot() {
    let f = fixture(2).await;
    generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025, None)
        .await
        .unwrap();

    let computed = get_summary(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025)
        .await
        .unwrap();
    assert_eq!(computed.data_source, DATA_SOURCE_COMPUTED);
    assert_eq!(computed.snapshot_refreshed_at, None);

    let snapshots = refresh_year(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);

    let summary = get_summary(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025)
        .await
        .unwrap();
    assert_eq!(summary.data_source, DATA_SOURCE_SNAPSHOT);
    assert!(summary.snapshot_refreshed_at.is_some());
    assert_eq!(summary.expected_amount_minor, computed.expected_amount_minor);
    assert_eq!(summary.delinquent_members, 2);
}

#[tokio::test]
async fn test_snapshot_refresh_is_idempotent() {
    let f = fixture(4).await;
    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(8), FEE)
        .await
        .unwrap();

    let first = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(8))
        .await
        .unwrap();
    let second = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(8))
        .await
        .unwrap();
    assert_eq!(first.expected_amount_minor, second.expected_amount_minor);
    assert_eq!(first.delinquent_members, second.delinquent_members);

    let stored = f
        .store
        .find_snapshot(TENANT, f.lodge_id, &PeriodKey::monthly(2025, 8).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.refreshed_at, second.refreshed_at);

    // Scope with no charges: zero amounts, live member count
    let empty = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(9))
        .await
        .unwrap();
    assert_eq!(empty.expected_amount_minor, 0);
    assert_eq!(empty.members_active, 4);
}

#[tokio::test]
async fn test_tenant_isolation() {
    let f = fixture(3).await;
    let (other_lodge, other_members) = seed_lodge(&f.store, OTHER_TENANT, 2).await;

    generate_charges(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(1), FEE)
        .await
        .unwrap();

    // Another tenant addressing this lodge sees no members and creates nothing
    let created = generate_charges(&f.store, OTHER_TENANT, f.lodge_id, PeriodType::Monthly, 2025, Some(1), FEE)
        .await
        .unwrap();
    assert_eq!(created, 0);

    let charges = f
        .store
        .list_charges(OTHER_TENANT, f.lodge_id, &BillingScope::year(PeriodType::Monthly, 2025))
        .await
        .unwrap();
    assert!(charges.is_empty());

    let mut request = payment(f.lodge_id, f.member_ids[0], 1, FEE);
    request.tenant_id = OTHER_TENANT.to_string();
    let err = record_payment(&f.store, request).await.unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));

    let err = cancel_charge(
        &f.store,
        OTHER_TENANT,
        f.lodge_id,
        f.member_ids[0],
        &PeriodKey::monthly(2025, 1).unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));

    let summary = get_summary(&f.store, OTHER_TENANT, f.lodge_id, PeriodType::Monthly, 2025)
        .await
        .unwrap();
    assert_eq!(summary.expected_amount_minor, 0);
    assert_eq!(summary.members_active, 0);

    // The other tenant's own lodge is unaffected by this tenant's data
    let created = generate_charges(&f.store, OTHER_TENANT, other_lodge, PeriodType::Monthly, 2025, Some(1), FEE)
        .await
        .unwrap();
    assert_eq!(created, other_members.len() as u64);
    let summary = get_summary(&f.store, TENANT, f.lodge_id, PeriodType::Monthly, 2025)
        .await
        .unwrap();
    assert_eq!(summary.expected_amount_minor, 3 * FEE);
}

#[tokio::test]
async fn test_snapshots_are_scoped_by_tenant() {
    let f = fixture(3).await;
    let annual = PeriodKey::annual(2025).unwrap();
    generate_year(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025, None)
        .await
        .unwrap();
    let own = refresh_snapshot(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025, None)
        .await
        .unwrap();
    assert_eq!(own.expected_amount_minor, 3 * FEE * 12);

    let foreign = f
        .store
        .find_snapshot(OTHER_TENANT, f.lodge_id, &annual)
        .await
        .unwrap();
    assert!(foreign.is_none());

    let summary = get_summary(&f.store, OTHER_TENANT, f.lodge_id, PeriodType::Annual, 2025)
        .await
        .unwrap();
    assert_eq!(summary.data_source, DATA_SOURCE_COMPUTED);
    assert_eq!(summary.expected_amount_minor, 0);
    assert_eq!(summary.paid_amount_minor, 0);
    assert_eq!(summary.open_amount_minor, 0);
    assert_eq!(summary.members_active, 0);

    // A refresh by the other tenant writes its own empty row only
    let theirs = refresh_snapshot(&f.store, OTHER_TENANT, f.lodge_id, PeriodType::Annual, 2025, None)
        .await
        .unwrap();
    assert_eq!(theirs.expected_amount_minor, 0);
    assert_eq!(theirs.members_active, 0);

    let stored = f
        .store
        .find_snapshot(TENANT, f.lodge_id, &annual)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, own);

    let summary = get_summary(&f.store, TENANT, f.lodge_id, PeriodType::Annual, 2025)
        .await
        .unwrap();
    assert_eq!(summary.data_source, DATA_SOURCE_SNAPSHOT);
    assert_eq!(summary.expected_amount_minor, 3 * FEE * 12);
    assert_eq!(summary.delinquent_members, 3);
}

#[tokio::test]
async fn test_explicit_paid_at_is_kept() {
    let f = fixture(1).await;
    let paid_at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    let mut request = payment(f.lodge_id, f.member_ids[0], 1, FEE);
    request.paid_at = Some(paid_at);
    request.method = PaymentMethod::Cash;

    let recorded = record_payment(&f.store, request).await.unwrap();
    assert_eq!(recorded.payment.paid_at, paid_at);
    assert_eq!(recorded.payment.method, PaymentMethod::Cash);
}
