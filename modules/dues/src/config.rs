use std::env;

use crate::periods::DEFAULT_ANNUAL_SPAN;

/// Which BillingStore implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Postgres,
    InMemory,
}

impl StoreType {
    fn parse(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "postgres" => Ok(StoreType::Postgres),
            "inmemory" => Ok(StoreType::InMemory),
            other => Err(format!(
                "Invalid STORE_TYPE: {}. Must be 'postgres' or 'inmemory'",
                other
            )),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub store_type: StoreType,
    pub host: String,
    pub port: u16,
    pub annual_period_span: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let store_type = StoreType::parse(
            &env::var("STORE_TYPE").unwrap_or_else(|_| "postgres".to_string()),
        )?;

        let database_url = env::var("DATABASE_URL").ok();
        if store_type == StoreType::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set when STORE_TYPE=postgres".to_string());
        }

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8095".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let annual_period_span: u32 = match env::var("ANNUAL_PERIOD_SPAN") {
            Ok(v) => v
                .parse()
                .ok()
                .filter(|span| *span >= 1)
                .ok_or_else(|| "ANNUAL_PERIOD_SPAN must be a positive integer".to_string())?,
            Err(_) => DEFAULT_ANNUAL_SPAN,
        };

        Ok(Config {
            database_url,
            store_type,
            host,
            port,
            annual_period_span,
        })
    }
}
