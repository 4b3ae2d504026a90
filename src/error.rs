//! # Error Handling
//!
//! Every failure an operation can report to its caller. Each variant maps to a
//! stable machine-readable [`ErrorKind`] and an HTTP-equivalent status code so
//! the API layer in front of this crate can translate errors without matching
//! on message text.

use crate::state_machine::OrderStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Cannot transition order from '{from}' to '{to}'")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{entity} {id} does not belong to customer {customer_id}")]
    Authorization {
        entity: &'static str,
        id: String,
        customer_id: String,
    },

    #[error("Concurrent modification of {resource}: {reason}")]
    Conflict { resource: String, reason: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Stable classification of an [`OrderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InvalidTransition,
    Authorization,
    Conflict,
    InvariantViolation,
    DeadlineExceeded,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation_error",
            Self::InvalidTransition => "invalid_transition",
            Self::Authorization => "authorization_error",
            Self::Conflict => "conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Storage => "storage_error",
        }
    }

    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Validation | Self::InvalidTransition => 400,
            Self::Authorization => 403,
            Self::Conflict => 409,
            Self::DeadlineExceeded => 408,
            Self::InvariantViolation | Self::Storage => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether a caller may safely retry the same request.
    ///
    /// Invariant violations are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::DeadlineExceeded)
    }
}

pub type OrderResult<T> = std::result::Result<T, OrderError>;

/// Helper function to create not-found errors
pub fn not_found(entity: &'static str, id: impl ToString) -> OrderError {
    OrderError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// Helper function to create validation errors naming the offending field
pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> OrderError {
    OrderError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

pub fn conflict(resource: impl Into<String>, reason: impl Into<String>) -> OrderError {
    OrderError::Conflict {
        resource: resource.into(),
        reason: reason.into(),
    }
}

/// Helper function to create invariant violations.
///
/// The violation is logged where it is detected.
pub fn invariant_violation(msg: impl Into<String>) -> OrderError {
    let msg = msg.into();
    tracing::error!(error = %msg, "❌ INVARIANT_VIOLATION");
    OrderError::InvariantViolation(msg)
}
