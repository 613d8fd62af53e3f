//! Rule violations raised by pure state transitions

use thiserror::Error;

/// A transition was rejected by the domain rules.
///
/// The engine maps these onto its own error taxonomy; the variants mirror
/// the caller-visible categories so no information is lost on the way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    /// Referenced entity is not part of this aggregate
    #[error("Not found: {0}")]
    NotFound(String),

    /// Action attempted outside its valid lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Actor is not allowed to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Action collides with something that already happened
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No room left
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),
}
