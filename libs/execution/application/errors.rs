//! Error taxonomy surfaced by the execution coordinator.
//!
//! Every terminal failure carries a category so callers can apply
//! category-specific recovery without string-matching error text.

use thiserror::Error;

use crate::infrastructure::precision::PrecisionError;

/// Failure categories surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    InsufficientFunds,
    /// Precision failures, further split by `PrecisionError`
    Precision,
    RateLimit,
    ServerError,
    Validation,
    Unknown,
}

impl ErrorCategory {
    /// Whether automatic retry can help. InsufficientFunds and Validation
    /// are surfaced immediately since retrying cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Authentication | ErrorCategory::RateLimit | ErrorCategory::ServerError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::InsufficientFunds => write!(f, "insufficient_funds"),
            ErrorCategory::Precision => write!(f, "precision"),
            ErrorCategory::RateLimit => write!(f, "rate_limit"),
            ErrorCategory::ServerError => write!(f, "server_error"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error(transparent)]
    Precision(#[from] PrecisionError),

    #[error("Rate limited after {attempts} attempts: {message}")]
    RateLimit { attempts: u32, message: String },

    #[error("Server error after {attempts} attempts: {message}")]
    ServerError { attempts: u32, message: String },

    #[error("Order rejected: {0}")]
    Validation(String),

    #[error("Unexpected failure: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

impl ExecutionError {
    /// The category callers branch on
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExecutionError::Authentication(_) => ErrorCategory::Authentication,
            ExecutionError::InsufficientFunds(_) => ErrorCategory::InsufficientFunds,
            ExecutionError::Precision(_) => ErrorCategory::Precision,
            ExecutionError::RateLimit { .. } => ErrorCategory::RateLimit,
            ExecutionError::ServerError { .. } => ErrorCategory::ServerError,
            ExecutionError::Validation(_) => ErrorCategory::Validation,
            ExecutionError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Build the error for a terminal failure in `category` after `attempts`
    pub(crate) fn terminal(category: ErrorCategory, message: String, attempts: u32) -> Self {
        match category {
            ErrorCategory::Authentication => ExecutionError::Authentication(message),
            ErrorCategory::InsufficientFunds => ExecutionError::InsufficientFunds(message),
            ErrorCategory::RateLimit => ExecutionError::RateLimit { attempts, message },
            ErrorCategory::ServerError => ExecutionError::ServerError { attempts, message },
            ErrorCategory::Validation => ExecutionError::Validation(message),
            ErrorCategory::Precision | ErrorCategory::Unknown => ExecutionError::Unknown(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(ErrorCategory::Authentication.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::ServerError.is_retryable());
        assert!(!ErrorCategory::InsufficientFunds.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Precision.is_retryable());
    }

    #[test]
    fn test_category_mapping() {
        let err = ExecutionError::RateLimit {
            attempts: 3,
            message: "too many requests".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert_eq!(err.category().to_string(), "rate_limit");

        let err = ExecutionError::Precision(PrecisionError::Unsatisfiable {
            order_type: crate::domain::OrderType::FOK,
            reason: "notional".to_string(),
        });
        assert_eq!(err.category(), ErrorCategory::Precision);
    }
}
