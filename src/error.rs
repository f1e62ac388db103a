//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Another settlement holds the lease on the source account
    #[error("Another payment is in progress")]
    SettlementInProgress,

    /// The settlement rail refused the transfer; the payment is recorded as failed
    #[error("Settlement failed: {reason}")]
    SettlementFailed { payment_id: uuid::Uuid, reason: String },

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Lease error: {0}")]
    Lease(#[from] crate::lease::LeaseError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Event publication failed: {0}")]
    Publish(#[from] crate::event_log::EventLogError),
}

impl AppError {
    /// Caller may retry the identical request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::SettlementInProgress)
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 404 Not Found
            AppError::PaymentNotFound(id) => {
                (StatusCode::NOT_FOUND, "payment_not_found", Some(id.clone()))
            }

            // 409 Conflict
            AppError::SettlementInProgress => {
                (StatusCode::CONFLICT, "settlement_in_progress", None)
            }

            // 422 Unprocessable Entity
            AppError::SettlementFailed { payment_id, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "settlement_failed",
                Some(payment_id.to_string()),
            ),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::MissingField(field) => {
                        (StatusCode::BAD_REQUEST, "missing_field", Some(field.to_string()))
                    }
                    DomainError::SameAccountTransfer => {
                        (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                    }
                    DomainError::InvalidStatusTransition { .. } => {
                        tracing::error!("Domain invariant violated: {}", domain_err);
                        (StatusCode::INTERNAL_SERVER_ERROR, "invalid_status_transition", None)
                    }
                }
            }

            // 500 Internal Server Error
            AppError::Lease(e) => {
                tracing::error!("Lease error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "lease_error", None)
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Publish(e) => {
                tracing::error!("Publish error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "publish_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::Domain(DomainError::SameAccountTransfer), StatusCode::BAD_REQUEST),
            (AppError::MissingHeader("X-User-Id".into()), StatusCode::BAD_REQUEST),
            (AppError::SettlementInProgress, StatusCode::CONFLICT),
            (
                AppError::SettlementFailed {
                    payment_id: uuid::Uuid::new_v4(),
                    reason: "rail offline".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::PaymentNotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AppError::Store(crate::store::StoreError::NotFound("config".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_only_contention_is_retryable() {
        assert!(AppError::SettlementInProgress.is_retryable());
        assert!(!AppError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn test_contention_response_carries_retry_after() {
        let response = AppError::SettlementInProgress.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = AppError::PaymentNotFound("x".into()).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
