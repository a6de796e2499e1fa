//! Store error types.

use thiserror::Error;

use labelflow_types::{ClassId, SampleId};

/// Errors that can occur during label store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Sample id outside `[0, N)`
    #[error("Sample {pid} is out of range (dataset has {len} samples)")]
    SampleOutOfRange { pid: SampleId, len: usize },

    /// Class id not in the session's class list
    #[error("Unknown class {class_id} (class list has {count} entries)")]
    UnknownClass { class_id: ClassId, count: usize },

    /// Class list malformed at construction
    #[error("Invalid class list: {0}")]
    InvalidClassList(String),

    /// Per-sample input of the wrong length
    #[error("Input length {actual} does not match sample count {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// IO error while persisting
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A loaded project record is internally inconsistent
    #[error("Corrupt project record: {0}")]
    CorruptRecord(String),
}
