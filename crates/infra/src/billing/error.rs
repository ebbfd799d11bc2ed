use thiserror::Error;

use crate::command_dispatcher::DispatchError;

/// Errors surfaced by the application services.
///
/// Every failure is scoped to the single operation attempted; callers map the
/// kinds onto their own surface (HTTP status codes for the API).
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid line item: {0}")]
    InvalidLineItem(String),
    #[error("invalid payment: {0}")]
    InvalidPayment(String),
    /// The invoice kept changing underneath the operation; re-fetch and retry.
    #[error("invoice was modified concurrently: {0}")]
    StaleInvoiceState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl BillingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            BillingError::InvalidAmount(_) => "invalid_amount",
            BillingError::InvalidLineItem(_) => "invalid_line_item",
            BillingError::InvalidPayment(_) => "invalid_payment",
            BillingError::StaleInvoiceState(_) => "stale_invoice_state",
            BillingError::Validation(_) => "validation_error",
            BillingError::InvariantViolation(_) => "invariant_violation",
            BillingError::NotFound(_) => "not_found",
            BillingError::Conflict(_) => "conflict",
            BillingError::TenantIsolation(_) => "tenant_isolation",
            BillingError::Infrastructure(_) => "internal_error",
        }
    }

    /// Map a dispatch failure for an operation on `what`.
    pub(crate) fn from_dispatch(err: DispatchError, what: &str) -> Self {
        match err {
            DispatchError::NotFound => BillingError::NotFound(what.to_string()),
            other => other.into(),
        }
    }
}

impl From<DispatchError> for BillingError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => BillingError::Conflict(msg),
            DispatchError::TenantIsolation(msg) => BillingError::TenantIsolation(msg),
            DispatchError::Validation(msg) => BillingError::Validation(msg),
            DispatchError::InvalidAmount(msg) => BillingError::InvalidAmount(msg),
            DispatchError::InvalidLineItem(msg) => BillingError::InvalidLineItem(msg),
            DispatchError::InvalidPayment(msg) => BillingError::InvalidPayment(msg),
            DispatchError::InvariantViolation(msg) => BillingError::InvariantViolation(msg),
            DispatchError::NotFound => BillingError::NotFound("aggregate".to_string()),
            DispatchError::Conflict(msg) => BillingError::Conflict(msg),
            DispatchError::Deserialize(msg) => BillingError::Infrastructure(msg),
            DispatchError::Store(e) => BillingError::Infrastructure(e.to_string()),
            DispatchError::Publish(msg) => BillingError::Infrastructure(msg),
        }
    }
}

impl From<invoicekit_core::DomainError> for BillingError {
    fn from(value: invoicekit_core::DomainError) -> Self {
        DispatchError::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use invoicekit_core::DomainError;

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: BillingError = DomainError::invalid_payment("amount must be positive").into();
        assert!(matches!(err, BillingError::InvalidPayment(_)));
        assert_eq!(err.code(), "invalid_payment");

        let err: BillingError = DomainError::not_found().into();
        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[test]
    fn store_failures_are_infrastructure() {
        let err = BillingError::from_dispatch(DispatchError::Deserialize("bad".into()), "invoice");
        assert_eq!(err.code(), "internal_error");
        let err = BillingError::from_dispatch(DispatchError::NotFound, "invoice 42");
        assert_eq!(err.to_string(), "not found: invoice 42");
    }
}
