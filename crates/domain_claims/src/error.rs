//! Claim context errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Field {0} is read-only during evaluation")]
    ReadOnlyField(String),

    #[error("Field {field} expects a {expected} value, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Value written to {0} does not fit in an integer amount")]
    Overflow(String),

    #[error("Unknown decision type: {0}")]
    UnknownDecision(String),

    #[error("Malformed context snapshot: {0}")]
    Snapshot(String),

    #[error("Unsupported context snapshot format: {0}")]
    UnsupportedSnapshotFormat(String),
}
