use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use dues_rs::{
    config::{Config, StoreType},
    db::init_pool_with_migrations,
    metrics::Metrics,
    router, AppState, BillingStore, InMemoryBillingStore, PgBillingStore,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting dues billing service...");

    let config = Config::from_env()
        .expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: host={}, port={}, store_type={:?}, annual_period_span={}",
        config.host,
        config.port,
        config.store_type,
        config.annual_period_span
    );

    let store: Arc<dyn BillingStore> = match config.store_type {
        StoreType::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL checked by Config::from_env");
            tracing::info!("Connecting to database and running migrations...");
            let pool = init_pool_with_migrations(database_url)
                .await
                .expect("Failed to initialize database");
            Arc::new(PgBillingStore::new(pool))
        }
        StoreType::InMemory => {
            tracing::warn!("Using InMemory billing store; data is lost on restart");
            Arc::new(InMemoryBillingStore::new())
        }
    };

    let metrics = Metrics::new().expect("Failed to register metrics");

    let state = Arc::new(AppState {
        store,
        metrics,
        annual_span: config.annual_period_span,
    });

    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("HOST:PORT must form a valid socket address");
    tracing::info!("Dues billing service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
