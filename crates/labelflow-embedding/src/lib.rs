//! # labelflow-embedding
//!
//! Incremental embedding cache for the labeling core.
//!
//! Re-running a nonlinear dimensionality reduction from scratch on every
//! label change would throw away layout work the user is looking at. This
//! crate caches one embedding per `(dataset_id, target_dims)` pair and
//! advances it through a refinement state machine, always re-using the
//! previous vectors as the starting point of the next fit.
//!
//! ## Features
//! - `Reducer` boundary trait; the reduction algorithm is an opaque
//!   collaborator
//! - `Uninitialized -> Initialized -> Refining -> Converged` state machine
//! - Identity fast path when no reduction is needed
//! - Per-key refine serialization; distinct keys refine concurrently

pub mod cache;
pub mod error;
pub mod reducer;
pub mod state;

pub use cache::EmbeddingCache;
pub use error::EmbeddingError;
pub use reducer::{FitParams, Reducer, ReducerError, ReducerInit};
pub use state::{EmbeddingState, RefinementStage};
