//! Core error types for fact parsing and validation.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Core error type for fact operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported permission '{value}'")]
    UnsupportedPermission { value: String },

    #[error("unsupported condition operator '{value}', expected LT or GT")]
    UnsupportedOperator { value: String },

    #[error("invalid fact: {reason}")]
    InvalidFact { reason: String },
}

impl Error {
    /// Create an unsupported permission error.
    pub fn unsupported_permission(value: impl Into<String>) -> Self {
        Self::UnsupportedPermission {
            value: value.into(),
        }
    }

    /// Create an unsupported operator error.
    pub fn unsupported_operator(value: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            value: value.into(),
        }
    }

    /// Create an invalid fact error.
    pub fn invalid_fact(reason: impl Into<String>) -> Self {
        Self::InvalidFact {
            reason: reason.into(),
        }
    }
}

/// The standard Result type for fact operations.
pub type Result<T> = std::result::Result<T, Error>;
