//! The external reducer boundary.
//!
//! The actual dimensionality-reduction procedure (manifold learner, neural
//! encoder, ...) lives outside the core. The cache treats it as a black box
//! satisfying `fit` and records only its numeric output.

use thiserror::Error;

use labelflow_types::{ClassId, FeatureMatrix, InitMethod};

/// Errors surfaced by a reducer implementation.
#[derive(Debug, Error)]
pub enum ReducerError {
    /// The fit failed
    #[error("Fit failed: {0}")]
    Fit(String),

    /// The reducer cannot produce the requested dimension
    #[error("Unsupported target dimension {0}")]
    UnsupportedDims(usize),
}

/// Starting layout for a fit.
#[derive(Debug, Clone, Copy)]
pub enum ReducerInit<'a> {
    /// Fresh layout from a named method
    Method(InitMethod),
    /// Resume from a previous embedding (row-major `[N, target_dims]`)
    Resume(&'a [f32]),
}

/// Fit parameters beyond the feature input.
#[derive(Debug, Clone)]
pub struct FitParams {
    /// Optimization epochs; 0 is a valid no-op budget
    pub epochs: usize,
    /// Learning rate
    pub learning_rate: f32,
    /// Current per-sample class assignment, usable as a supervision signal
    pub seed_classes: Vec<ClassId>,
}

impl FitParams {
    pub fn new(epochs: usize, learning_rate: f32) -> Self {
        Self {
            epochs,
            learning_rate,
            seed_classes: Vec::new(),
        }
    }

    pub fn with_seed_classes(mut self, seed_classes: Vec<ClassId>) -> Self {
        self.seed_classes = seed_classes;
        self
    }
}

/// Trait for dimensionality reducers.
///
/// Implementations must be thread-safe (Send + Sync); fits run on blocking
/// workers.
pub trait Reducer: Send + Sync {
    /// Human-readable reducer name, for logging.
    fn name(&self) -> &str;

    /// Fit an embedding of `features` into `target_dims` dimensions.
    ///
    /// Returns row-major `[N, target_dims]` output. When `init` is
    /// `Resume`, the returned layout must be a continuation of the given
    /// vectors, not a restart.
    fn fit(
        &self,
        features: &FeatureMatrix,
        target_dims: usize,
        init: ReducerInit<'_>,
        params: &FitParams,
    ) -> Result<Vec<f32>, ReducerError>;
}
