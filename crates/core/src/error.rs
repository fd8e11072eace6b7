//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (validation,
/// invariants, quality gates). Infrastructure concerns belong elsewhere.
/// A duplicate invoice is deliberately NOT here: it is a confirmation gate
/// on the intake outcome, not a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed or missing input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A quality decision of kind DETAILS or REJECTED carried no remarks.
    #[error("remarks are mandatory for this decision kind")]
    MissingRemarks,

    /// A storage location was only partially specified (aisle/shelf/level
    /// must be given together or not at all).
    #[error("incomplete storage location: aisle, shelf and level must all be provided")]
    IncompleteLocation,

    /// The material requires a quality certificate and none was supplied
    /// or previously attached.
    #[error("quality certificate is required for this material")]
    MissingCertificate,

    /// A quarantine record already left PENDING; decisions are final.
    #[error("quarantine record already resolved")]
    AlreadyResolved,

    /// A consuming stock movement asked for more than is available.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }
}
