//! Engine error taxonomy

use clawbr_core::RuleViolation;
use clawbr_persist::StorageError;

/// Engine result type alias
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to callers of the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence failed; rating and bracket writes are never swallowed
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// A bracket or rating invariant was found broken
    #[error("Integrity fault: {0}")]
    Integrity(String),
}

impl EngineError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InvalidState(_) => "INVALID_STATE",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Storage(_) => "STORAGE_ERROR",
            EngineError::Integrity(_) => "INTEGRITY_FAULT",
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Storage(StorageError::Contention(_))
                | EngineError::Storage(StorageError::Connection(_))
        )
    }
}

impl From<RuleViolation> for EngineError {
    fn from(v: RuleViolation) -> Self {
        match v {
            RuleViolation::NotFound(msg) => EngineError::NotFound(msg),
            RuleViolation::InvalidState(msg) => EngineError::InvalidState(msg),
            RuleViolation::Forbidden(msg) => EngineError::Forbidden(msg),
            RuleViolation::Conflict(msg) => EngineError::Conflict(msg),
            RuleViolation::CapacityExceeded(msg) => EngineError::CapacityExceeded(msg),
            RuleViolation::Validation(msg) => EngineError::Validation(msg),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => EngineError::NotFound(key),
            other => EngineError::Storage(other),
        }
    }
}
