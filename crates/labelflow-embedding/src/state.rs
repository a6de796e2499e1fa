//! Embedding state and refinement stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of incremental progress of a cached embedding.
///
/// `Uninitialized -> Initialized -> Refining -> Converged`, with a
/// `Refining` self-loop per additional refinement request and an explicit
/// reset path back to `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStage {
    Uninitialized,
    Initialized,
    Refining,
    Converged,
}

impl RefinementStage {
    /// True when a refine call is legal in this stage.
    pub fn can_refine(&self) -> bool {
        matches!(self, RefinementStage::Initialized | RefinementStage::Refining)
    }
}

impl std::fmt::Display for RefinementStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefinementStage::Uninitialized => write!(f, "uninitialized"),
            RefinementStage::Initialized => write!(f, "initialized"),
            RefinementStage::Refining => write!(f, "refining"),
            RefinementStage::Converged => write!(f, "converged"),
        }
    }
}

/// One cached reduced embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingState {
    /// Dataset the embedding belongs to
    pub dataset_id: String,
    /// Width of `vectors` rows. For identity embeddings this is the source
    /// feature dimension, not the requested reduction target.
    pub target_dims: usize,
    /// Row-major `[N, target_dims]` embedding coordinates
    pub vectors: Vec<f32>,
    /// Number of samples (rows)
    pub sample_count: usize,
    /// Refinement progress
    pub stage: RefinementStage,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingState {
    /// One sample's embedded coordinates.
    pub fn row(&self, pid: usize) -> &[f32] {
        &self.vectors[pid * self.target_dims..(pid + 1) * self.target_dims]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_refine() {
        assert!(!RefinementStage::Uninitialized.can_refine());
        assert!(RefinementStage::Initialized.can_refine());
        assert!(RefinementStage::Refining.can_refine());
        assert!(!RefinementStage::Converged.can_refine());
    }

    #[test]
    fn test_row_access() {
        let state = EmbeddingState {
            dataset_id: "ds".to_string(),
            target_dims: 2,
            vectors: vec![0.0, 1.0, 2.0, 3.0],
            sample_count: 2,
            stage: RefinementStage::Initialized,
            updated_at: Utc::now(),
        };
        assert_eq!(state.row(1), &[2.0, 3.0]);
    }
}
