//! Input validation for billing operations
//!
//! Checks that do not need the store: amounts, years, month/type pairing,
//! pagination bounds and tenant identifiers.

use thiserror::Error;

pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Validation errors for billing requests
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("tenant_id cannot be empty")]
    EmptyTenantId,

    #[error("Year must be between 2000 and 2100, got {0}")]
    InvalidYear(i32),

    #[error("MONTHLY periods require a month")]
    MissingMonth,

    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(i32),

    #[error("ANNUAL periods must not carry a month, got {0}")]
    UnexpectedMonth(i32),

    #[error("Expected amount must be non-negative, got {0}")]
    NegativeExpectedAmount(i64),

    #[error("Payment amount must be positive, got {0}")]
    NonPositivePaymentAmount(i64),

    #[error("Invalid amount '{0}': expected a decimal with at most two fractional digits")]
    MalformedAmount(String),

    #[error("Invalid pagination: page={page}, limit={limit}")]
    InvalidPagination { page: i64, limit: i64 },
}

pub fn validate_tenant_id(tenant_id: &str) -> Result<(), ValidationError> {
    if tenant_id.trim().is_empty() {
        return Err(ValidationError::EmptyTenantId);
    }
    Ok(())
}

pub fn validate_year(year: i32) -> Result<(), ValidationError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ValidationError::InvalidYear(year));
    }
    Ok(())
}

/// Charges may be zero (exempt members) but never negative
pub fn validate_expected_amount(amount_minor: i64) -> Result<(), ValidationError> {
    if amount_minor < 0 {
        return Err(ValidationError::NegativeExpectedAmount(amount_minor));
    }
    Ok(())
}

pub fn validate_payment_amount(amount_minor: i64) -> Result<(), ValidationError> {
    if amount_minor <= 0 {
        return Err(ValidationError::NonPositivePaymentAmount(amount_minor));
    }
    Ok(())
}

/// Resolve 1-based `page` and `limit` into `(limit, offset)`
pub fn validate_pagination(
    page: Option<i64>,
    limit: Option<i64>,
) -> Result<(i64, i64), ValidationError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ValidationError::InvalidPagination { page, limit });
    }
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or(ValidationError::InvalidPagination { page, limit })?;
    Ok((limit, offset))
}
