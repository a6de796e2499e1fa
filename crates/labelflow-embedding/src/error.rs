//! Embedding error types.

use thiserror::Error;

use crate::reducer::ReducerError;
use crate::state::RefinementStage;

/// Errors that can occur during embedding cache operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Operation called in the wrong state-machine phase
    #[error("Embedding '{key}' is {stage}; cannot {operation}")]
    InvalidState {
        key: String,
        stage: RefinementStage,
        operation: &'static str,
    },

    /// The external reducer failed
    #[error("Reducer error: {0}")]
    Reducer(#[from] ReducerError),

    /// Reducer output does not match the expected shape
    #[error("Reducer output length {actual}, expected {expected}")]
    OutputShape { expected: usize, actual: usize },

    /// Feature input does not match the cached entry's sample count
    #[error("Feature matrix has {actual} rows, cached embedding has {expected}")]
    SampleCountMismatch { expected: usize, actual: usize },
}
