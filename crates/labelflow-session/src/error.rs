//! Session error types.

use thiserror::Error;

use labelflow_embedding::EmbeddingError;
use labelflow_graph::GraphError;
use labelflow_store::StoreError;

/// Errors surfaced by session commands.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Graph construction or propagation failure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Embedding cache failure
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Label store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A background task died before delivering its result
    #[error("Background task failed: {0}")]
    Task(String),
}
