//! Error types for the Tally engine.

use crate::{EntityKind, OperationId};
use thiserror::Error;

/// All possible errors from the Tally engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("record kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },

    // Replay errors
    #[error("operation {0} has no entity id to target")]
    UnresolvableOperation(OperationId),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
