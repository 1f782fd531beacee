//! Billing service errors

use thiserror::Error;

use crate::store::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("A confirmed payment already exists for member {member_id} in period {period_id}")]
    DuplicatePayment { member_id: uuid::Uuid, period_id: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Charge for period {0} is canceled and cannot receive payments")]
    ChargeCanceled(String),

    #[error("Charge {charge_id} is {status} and cannot be canceled")]
    ChargeNotCancelable { charge_id: uuid::Uuid, status: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl BillingError {
    /// Stable machine-readable code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "VALIDATION_ERROR",
            BillingError::DuplicatePayment { .. } => "DUPLICATE_PAYMENT",
            BillingError::NotFound(_) => "NOT_FOUND",
            BillingError::ChargeCanceled(_) => "CHARGE_CANCELED",
            BillingError::ChargeNotCancelable { .. } => "CHARGE_NOT_CANCELABLE",
            BillingError::Store(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            BillingError::from(ValidationError::MissingMonth).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            BillingError::Store(StoreError::Unavailable("pool closed".into())).code(),
            "INTERNAL_ERROR"
        );
        assert_eq!(BillingError::NotFound("Member".into()).code(), "NOT_FOUND");
    }
}
