//! Common test utilities for dues billing tests
//!
//! Most tests run against `InMemoryBillingStore`. Postgres tests share one
//! pool per test binary and are skipped when `DATABASE_URL` is unset.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use dues_rs::db::init_pool_with_migrations;
use dues_rs::metrics::Metrics;
use dues_rs::models::{Lodge, Member, MemberStatus};
use dues_rs::periods::DEFAULT_ANNUAL_SPAN;
use dues_rs::{router, AppState, InMemoryBillingStore};

pub const TENANT: &str = "tenant-alpha";
pub const OTHER_TENANT: &str = "tenant-beta";

/// 150.00 in minor units
pub const FEE: i64 = 15000;

/// A lodge with its active members, seeded into an in-memory store
pub struct Fixture {
    pub store: InMemoryBillingStore,
    pub lodge_id: Uuid,
    pub member_ids: Vec<Uuid>,
}

/// Seed `members` active members named "Member 0000".. into a fresh lodge
pub async fn seed_lodge(store: &InMemoryBillingStore, tenant_id: &str, members: usize) -> (Uuid, Vec<Uuid>) {
    let lodge_id = Uuid::new_v4();
    store
        .insert_lodge(Lodge {
            id: lodge_id,
            tenant_id: tenant_id.to_string(),
            name: format!("Lodge {}", &lodge_id.to_string()[..8]),
            monthly_fee_minor: FEE,
            annual_fee_minor: FEE * 12,
            due_day: 10,
        })
        .await;

    let mut member_ids = Vec::with_capacity(members);
    for i in 0..members {
        let id = Uuid::new_v4();
        store
            .insert_member(Member {
                id,
                tenant_id: tenant_id.to_string(),
                lodge_id,
                full_name: format!("Member {:04}", i),
                status: MemberStatus::Active,
            })
            .await;
        member_ids.push(id);
    }
    (lodge_id, member_ids)
}

pub async fn fixture(members: usize) -> Fixture {
    let store = InMemoryBillingStore::new();
    let (lodge_id, member_ids) = seed_lodge(&store, TENANT, members).await;
    Fixture {
        store,
        lodge_id,
        member_ids,
    }
}

/// Build the router over a store
pub fn app(store: &InMemoryBillingStore) -> Router {
    let state = Arc::new(AppState {
        store: Arc::new(store.clone()),
        metrics: Metrics::new().expect("metrics registry"),
        annual_span: DEFAULT_ANNUAL_SPAN,
    });
    router(state)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Read response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read response body as text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Singleton pool instance shared across all tests in this binary
static TEST_POOL: OnceCell<Option<PgPool>> = OnceCell::const_new();

/// Shared Postgres pool, or `None` when `DATABASE_URL` is unset
///
/// Migrations are applied on first use.
pub async fn test_pool() -> Option<PgPool> {
    if std::env::var("DB_MAX_CONNECTIONS").is_err() {
        std::env::set_var("DB_MAX_CONNECTIONS", "2");
    }

    TEST_POOL
        .get_or_init(|| async {
            let database_url = std::env::var("DATABASE_URL").ok()?;
            Some(
                init_pool_with_migrations(&database_url)
                    .await
                    .expect("Failed to initialize test pool"),
            )
        })
        .await
        .clone()
}

/// Insert a lodge and `members` active members directly into Postgres
pub async fn seed_pg_lodge(pool: &PgPool, tenant_id: &str, members: usize) -> (Uuid, Vec<Uuid>) {
    let lodge_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO lodges (id, tenant_id, name, monthly_fee_minor, annual_fee_minor, due_day)
        VALUES ($1, $2, $3, $4, $5, 10)
        "#,
    )
    .bind(lodge_id)
    .bind(tenant_id)
    .bind("Test Lodge")
    .bind(FEE)
    .bind(FEE * 12)
    .execute(pool)
    .await
    .expect("Failed to insert test lodge");

    let mut member_ids = Vec::with_capacity(members);
    for i in 0..members {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO members (id, tenant_id, lodge_id, full_name, status)
            VALUES ($1, $2, $3, $4, 'ACTIVE')
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(lodge_id)
        .bind(format!("Member {:04}", i))
        .execute(pool)
        .await
        .expect("Failed to insert test member");
        member_ids.push(id);
    }
    (lodge_id, member_ids)
}

/// Delete everything a test created under a lodge
pub async fn cleanup_pg_lodge(pool: &PgPool, lodge_id: Uuid) {
    for statement in [
        "UPDATE dues_charges SET paid_payment_id = NULL WHERE lodge_id = $1",
        "DELETE FROM payments WHERE lodge_id = $1",
        "DELETE FROM dues_charges WHERE lodge_id = $1",
        "DELETE FROM kpi_snapshots WHERE lodge_id = $1",
        "DELETE FROM billing_periods WHERE lodge_id = $1",
        "DELETE FROM members WHERE lodge_id = $1",
        "DELETE FROM lodges WHERE id = $1",
    ] {
        sqlx::query(statement)
            .bind(lodge_id)
            .execute(pool)
            .await
            .expect("Failed to clean up test data");
    }
}
