//! The embedding cache.
//!
//! One `EmbeddingState` per `(dataset_id, target_dims)` key. Refinements on
//! the same key are serialized so no two fits ever run against the same
//! mutable embedding buffer; distinct keys refine independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use labelflow_types::{ClassId, FeatureMatrix, InitMethod, ReductionConfig};

use crate::error::EmbeddingError;
use crate::reducer::{FitParams, Reducer, ReducerError, ReducerInit};
use crate::state::{EmbeddingState, RefinementStage};

type CacheKey = (String, usize);

fn key_id(dataset_id: &str, target_dims: usize) -> String {
    format!("{}-{}", target_dims, dataset_id)
}

struct EntrySlot {
    state: Mutex<EmbeddingState>,
    /// Held across a fit; serializes refines per key
    fit_lock: tokio::sync::Mutex<()>,
}

/// Cache of incremental embeddings, one per `(dataset_id, target_dims)`.
pub struct EmbeddingCache {
    reducer: Arc<dyn Reducer>,
    config: ReductionConfig,
    entries: Mutex<HashMap<CacheKey, Arc<EntrySlot>>>,
}

impl EmbeddingCache {
    pub fn new(reducer: Arc<dyn Reducer>, config: ReductionConfig) -> Self {
        Self {
            reducer,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, dataset_id: &str, target_dims: usize) -> Option<Arc<EntrySlot>> {
        self.entries
            .lock()
            .unwrap()
            .get(&(dataset_id.to_string(), target_dims))
            .cloned()
    }

    /// Read-only lookup; never triggers computation.
    pub fn get(&self, dataset_id: &str, target_dims: usize) -> Option<EmbeddingState> {
        self.slot(dataset_id, target_dims)
            .map(|slot| slot.state.lock().unwrap().clone())
    }

    /// Drop the cached entry, forcing the next `initialize` to rebuild.
    ///
    /// Used when the similarity graph or feature space changes materially.
    pub fn invalidate(&self, dataset_id: &str, target_dims: usize) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap()
            .remove(&(dataset_id.to_string(), target_dims))
            .is_some();
        if removed {
            debug!(key = %key_id(dataset_id, target_dims), "Invalidated embedding");
        }
        removed
    }

    /// Look up or create the embedding for `(dataset_id, target_dims)`.
    ///
    /// An existing entry is returned untouched. When `target_dims` is at
    /// least the feature dimension the embedding is the identity map and
    /// converges immediately; otherwise one low-cost bootstrap fit runs and
    /// the entry lands in `Initialized`.
    pub async fn initialize(
        &self,
        dataset_id: &str,
        target_dims: usize,
        features: Arc<FeatureMatrix>,
        init: InitMethod,
    ) -> Result<EmbeddingState, EmbeddingError> {
        if let Some(existing) = self.get(dataset_id, target_dims) {
            return Ok(existing);
        }

        let state = if target_dims >= features.cols() {
            debug!(
                key = %key_id(dataset_id, target_dims),
                feature_dims = features.cols(),
                "No reduction needed; using identity embedding"
            );
            EmbeddingState {
                dataset_id: dataset_id.to_string(),
                target_dims: features.cols(),
                vectors: features.as_slice().to_vec(),
                sample_count: features.rows(),
                stage: RefinementStage::Converged,
                updated_at: Utc::now(),
            }
        } else {
            info!(
                key = %key_id(dataset_id, target_dims),
                reducer = self.reducer.name(),
                %init,
                "Bootstrapping embedding"
            );
            let params = FitParams::new(self.config.bootstrap_epochs, self.config.learning_rate);
            let vectors = self
                .run_fit(Arc::clone(&features), target_dims, FitInit::Method(init), params)
                .await?;
            expect_shape(&vectors, features.rows() * target_dims)?;
            EmbeddingState {
                dataset_id: dataset_id.to_string(),
                target_dims,
                vectors,
                sample_count: features.rows(),
                stage: RefinementStage::Initialized,
                updated_at: Utc::now(),
            }
        };

        // Another initialize may have won the race while the fit ran
        let mut entries = self.entries.lock().unwrap();
        let slot = Arc::clone(
            entries
                .entry((dataset_id.to_string(), target_dims))
                .or_insert_with(|| {
                    Arc::new(EntrySlot {
                        state: Mutex::new(state),
                        fit_lock: tokio::sync::Mutex::new(()),
                    })
                }),
        );
        drop(entries);
        let state = slot.state.lock().unwrap().clone();
        Ok(state)
    }

    /// Refine the cached embedding, re-using its vectors as the fit's
    /// starting point.
    ///
    /// Legal only in `Initialized` or `Refining`; a missing entry counts as
    /// `Uninitialized`. An `epochs` of 0 returns the current state
    /// unchanged.
    pub async fn refine(
        &self,
        dataset_id: &str,
        target_dims: usize,
        features: Arc<FeatureMatrix>,
        epochs: usize,
        learning_rate: f32,
        seed_classes: &[ClassId],
    ) -> Result<EmbeddingState, EmbeddingError> {
        let key = key_id(dataset_id, target_dims);
        let slot = self.slot(dataset_id, target_dims).ok_or_else(|| {
            EmbeddingError::InvalidState {
                key: key.clone(),
                stage: RefinementStage::Uninitialized,
                operation: "refine",
            }
        })?;

        let _fit_guard = slot.fit_lock.lock().await;

        let snapshot = slot.state.lock().unwrap().clone();
        if !snapshot.stage.can_refine() {
            return Err(EmbeddingError::InvalidState {
                key,
                stage: snapshot.stage,
                operation: "refine",
            });
        }
        if features.rows() != snapshot.sample_count {
            return Err(EmbeddingError::SampleCountMismatch {
                expected: snapshot.sample_count,
                actual: features.rows(),
            });
        }
        if epochs == 0 {
            return Ok(snapshot);
        }

        debug!(key = %key, epochs, "Refining embedding");
        let params = FitParams::new(epochs, learning_rate).with_seed_classes(seed_classes.to_vec());
        let vectors = self
            .run_fit(
                features,
                snapshot.target_dims,
                FitInit::Resume(snapshot.vectors),
                params,
            )
            .await?;
        expect_shape(&vectors, snapshot.sample_count * snapshot.target_dims)?;

        let mut state = slot.state.lock().unwrap();
        state.vectors = vectors;
        state.stage = RefinementStage::Refining;
        state.updated_at = Utc::now();
        Ok(state.clone())
    }

    /// Rewind a `Refining` or `Converged` entry to `Initialized`, keeping
    /// its vectors as the starting layout for the next refine.
    pub fn reset(
        &self,
        dataset_id: &str,
        target_dims: usize,
    ) -> Result<EmbeddingState, EmbeddingError> {
        let slot = self.slot(dataset_id, target_dims).ok_or_else(|| {
            EmbeddingError::InvalidState {
                key: key_id(dataset_id, target_dims),
                stage: RefinementStage::Uninitialized,
                operation: "reset",
            }
        })?;
        let mut state = slot.state.lock().unwrap();
        state.stage = RefinementStage::Initialized;
        state.updated_at = Utc::now();
        debug!(key = %key_id(dataset_id, target_dims), "Reset embedding to initialized");
        Ok(state.clone())
    }

    async fn run_fit(
        &self,
        features: Arc<FeatureMatrix>,
        target_dims: usize,
        init: FitInit,
        params: FitParams,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let reducer = Arc::clone(&self.reducer);
        let vectors = tokio::task::spawn_blocking(move || {
            let init_ref = match &init {
                FitInit::Method(m) => ReducerInit::Method(*m),
                FitInit::Resume(v) => ReducerInit::Resume(v.as_slice()),
            };
            reducer.fit(&features, target_dims, init_ref, &params)
        })
        .await
        .map_err(|e| ReducerError::Fit(format!("fit task failed: {}", e)))??;
        Ok(vectors)
    }
}

/// Owned variant of `ReducerInit` that can cross into a blocking task.
enum FitInit {
    Method(InitMethod),
    Resume(Vec<f32>),
}

fn expect_shape(vectors: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::OutputShape {
            expected,
            actual: vectors.len(),
        });
    }
    Ok(())
}
