//! Crate-wide error taxonomy.
//!
//! Mirrors the error taxonomy at the component boundary: every public
//! operation returns `Result<T>` with a variant drawn from this enum.
//! Module-local error types (e.g. [`crate::provider::ProviderError`],
//! [`crate::applier::ApplyError`]) convert into it via `#[from]`.

use thiserror::Error;

/// Stable error taxonomy for the right-sizing engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule, config value, or recommendation failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A requested series, pod, or rule does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with concurrent state (e.g. a stale resize).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A transient failure; the caller may retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// The platform lacks a capability the operation requires.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The caller lacks permission for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An internal invariant was violated; indicates a bug, not bad input.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Stable machine-readable code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Transient(_) => "transient",
            Error::Unsupported(_) => "unsupported",
            Error::Forbidden(_) => "forbidden",
            Error::InvariantViolation(_) => "invariant_violation",
        }
    }

    /// Whether a caller may reasonably retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
