pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod money;
pub mod periods;
pub mod routes;
pub mod services;
pub mod store;
pub mod validation;

pub use error::BillingError;
pub use routes::{router, AppState};
pub use store::{BillingStore, InMemoryBillingStore, PgBillingStore, StoreError};
