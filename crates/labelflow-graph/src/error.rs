//! Graph error types.

use thiserror::Error;

use labelflow_types::SampleId;

/// Errors that can occur during graph construction or propagation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Not enough samples for the requested neighbor count
    #[error("Cannot build a {k}-NN graph over {n} samples (need at least k + 1)")]
    TooFewSamples { n: usize, k: usize },

    /// A sample's feature row contains NaN or infinite values, leaving it
    /// without valid neighbors
    #[error("Sample {pid} has non-finite feature values")]
    NonFiniteFeatures { pid: SampleId },

    /// A per-sample input does not match the graph's node count
    #[error("Input length {actual} does not match graph node count {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// ANN index error
    #[error("Index error: {0}")]
    Index(String),
}
