//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::payment::PaymentStatus;

/// Business rule violations and domain invariant failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A required field was missing or blank
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Payment status may only leave `pending`
    #[error("Invalid payment status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Transfer to same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,
}

impl DomainError {
    /// Check if this is a client error (caller's fault, never retried)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_) | Self::MissingField(_) | Self::SameAccountTransfer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_client_errors() {
        assert!(DomainError::InvalidAmount("0".to_string()).is_client_error());
        assert!(DomainError::MissingField("from_account_id").is_client_error());
        assert!(DomainError::SameAccountTransfer.is_client_error());
    }

    #[test]
    fn test_status_transition_message() {
        let err = DomainError::InvalidStatusTransition {
            from: PaymentStatus::Completed,
            to: PaymentStatus::Failed,
        };
        assert!(!err.is_client_error());
        assert_eq!(
            err.to_string(),
            "Invalid payment status transition: completed -> failed"
        );
    }
}
