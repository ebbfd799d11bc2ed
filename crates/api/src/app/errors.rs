use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use invoicekit_core::DomainError;
use invoicekit_infra::billing::BillingError;
use invoicekit_infra::read_side::ReadSideError;

/// Everything a handler can fail with, rendered as `{ "error", "message" }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error(transparent)]
    ReadSide(#[from] ReadSideError),
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },
    #[error("{0} not found")]
    NotFound(String),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Request parsing problems keep the domain's error kind.
impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidId(msg) => ApiError::bad_request("invalid_id", msg),
            other => ApiError::Billing(other.into()),
        }
    }
}

pub fn billing_status(err: &BillingError) -> StatusCode {
    match err {
        BillingError::InvalidAmount(_)
        | BillingError::InvalidLineItem(_)
        | BillingError::InvalidPayment(_)
        | BillingError::Validation(_) => StatusCode::BAD_REQUEST,
        BillingError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        // Another tenant's resource is reported exactly like a missing one.
        BillingError::NotFound(_) | BillingError::TenantIsolation(_) => StatusCode::NOT_FOUND,
        BillingError::Conflict(_) | BillingError::StaleInvoiceState(_) => StatusCode::CONFLICT,
        BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Billing(BillingError::TenantIsolation(msg)) => {
                tracing::warn!(%msg, "cross-tenant access rejected");
                json_error(StatusCode::NOT_FOUND, "not_found", "not found")
            }
            ApiError::Billing(err) => {
                let status = billing_status(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                json_error(status, err.code(), err.to_string())
            }
            ApiError::ReadSide(err) => {
                tracing::error!(error = %err, "read side unavailable");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "read models are unavailable",
                )
            }
            ApiError::BadRequest { code, message } => {
                json_error(StatusCode::BAD_REQUEST, code, message)
            }
            ApiError::NotFound(what) => {
                json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
