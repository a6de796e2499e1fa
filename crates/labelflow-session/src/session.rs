//! The label session.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use labelflow_broadcast::{SelectionBroadcaster, ViewListener};
use labelflow_embedding::{EmbeddingCache, EmbeddingState, Reducer};
use labelflow_graph::{DiffusionOutcome, PropagationEngine, PropagationOutcome};
use labelflow_store::{LabelStore, ProjectRecord};
use labelflow_types::{
    Action, ClassId, ClassLabel, FeatureMatrix, SampleId, SelectionEvent, SessionConfig,
    UNCLASSIFIED,
};

use crate::error::SessionError;

/// Result of a spread or distance command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The result was merged and republished
    Applied { adopted: usize },
    /// The graph is still building; retry later
    NotReady,
    /// Marks changed while the job ran; the result was discarded
    Stale,
    /// No non-transient marker provides a seed
    NoSeeds,
}

/// One dataset's labeling session.
///
/// Owns the four core components; collaborators receive snapshots through
/// the command surface, never direct mutable references.
pub struct LabelSession {
    dataset_id: String,
    features: Arc<FeatureMatrix>,
    config: SessionConfig,
    store: LabelStore,
    engine: Arc<PropagationEngine>,
    cache: EmbeddingCache,
    broadcaster: SelectionBroadcaster,
}

impl LabelSession {
    pub fn new(
        dataset_id: impl Into<String>,
        features: FeatureMatrix,
        classes: Vec<ClassLabel>,
        reducer: Arc<dyn Reducer>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let dataset_id = dataset_id.into();
        let store = LabelStore::new(features.rows(), classes)?;
        let engine = Arc::new(PropagationEngine::new(config.propagation.clone()));
        let cache = EmbeddingCache::new(reducer, config.reduction.clone());
        info!(
            dataset = %dataset_id,
            samples = features.rows(),
            dims = features.cols(),
            "Session created"
        );
        Ok(Self {
            dataset_id,
            features: Arc::new(features),
            config,
            store,
            engine,
            cache,
            broadcaster: SelectionBroadcaster::new(),
        })
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn features(&self) -> &Arc<FeatureMatrix> {
        &self.features
    }

    pub fn store(&self) -> &LabelStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<PropagationEngine> {
        &self.engine
    }

    /// Register a view for selection and classification updates.
    pub fn register_view(&mut self, id: impl Into<String>, listener: Arc<dyn ViewListener>) {
        self.broadcaster.register_listener(id, listener);
    }

    /// Record a selection event and fan it out to every view.
    ///
    /// Events carrying a class mark the samples into it; plain highlights
    /// become the transient class-0 marker. Returns the number of listeners
    /// that accepted the event.
    pub fn handle_selection(&mut self, event: &SelectionEvent) -> Result<usize, SessionError> {
        let class_id = event.class_id.unwrap_or(UNCLASSIFIED);
        let pids: BTreeSet<SampleId> = event.sample_ids.iter().copied().collect();
        self.store.mark(&event.source_view, &pids, class_id)?;
        Ok(self.broadcaster.publish(event))
    }

    /// Change the class new marks default to.
    pub fn select_class(&mut self, class_id: ClassId) -> Result<(), SessionError> {
        self.store.set_selected_class(class_id)?;
        Ok(())
    }

    /// Mark samples into the currently selected class.
    pub fn mark_selected(
        &mut self,
        actor: &str,
        sample_ids: &BTreeSet<SampleId>,
    ) -> Result<(), SessionError> {
        self.store.mark_selected(actor, sample_ids)?;
        Ok(())
    }

    /// Undo the most recent action and republish the classification.
    pub fn undo(&mut self) -> Option<Action> {
        let action = self.store.undo()?;
        self.broadcaster
            .publish_classification(&self.store.classification(), self.store.activation());
        Some(action)
    }

    /// Build the similarity graph on a blocking worker and wait for it.
    ///
    /// Rebuilding invalidates the cached embedding for this session's
    /// target dimension: the feature space feeding both has changed.
    pub async fn rebuild_graph(&self) -> Result<(), SessionError> {
        self.cache
            .invalidate(&self.dataset_id, self.config.reduction.target_dims);
        self.engine
            .begin_rebuild(Arc::clone(&self.features))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))??;
        Ok(())
    }

    /// Spread the current marks over the similarity graph.
    ///
    /// The seed vector and store generation are snapshotted up front; if
    /// marks change while the spread runs, the in-flight result is
    /// discarded as stale and the caller may simply re-issue the command.
    pub async fn spread(&mut self, max_iters: Option<usize>) -> Result<CommandStatus, SessionError> {
        let seed = self.store.classification();
        let generation = self.store.generation();
        let iters = max_iters.unwrap_or(self.config.propagation.spread_iters);

        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || engine.spread(&seed, iters))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))??;

        match outcome {
            PropagationOutcome::NotReady => {
                debug!("Spread requested before graph is ready");
                Ok(CommandStatus::NotReady)
            }
            PropagationOutcome::Complete(result) => {
                if self.store.generation() != generation {
                    warn!(
                        observed = generation,
                        current = self.store.generation(),
                        "Discarding stale spread result"
                    );
                    return Ok(CommandStatus::Stale);
                }
                let adopted = self.store.apply_propagation(&result.classes)?;
                self.broadcaster
                    .publish_classification(&self.store.classification(), Some(&result.activation));
                Ok(CommandStatus::Applied { adopted })
            }
        }
    }

    /// Diffuse a distance field outward from the marked samples and store
    /// it as the activation overlay.
    pub async fn color_by_distance(
        &mut self,
        max_iters: Option<usize>,
    ) -> Result<CommandStatus, SessionError> {
        let mut seed_mask = vec![false; self.store.sample_count()];
        for marker in self.store.markers() {
            if marker.is_transient() {
                continue;
            }
            for &pid in &marker.sample_ids {
                seed_mask[pid] = true;
            }
        }
        if !seed_mask.iter().any(|&s| s) {
            debug!("Distance coloring requested with no marked samples");
            return Ok(CommandStatus::NoSeeds);
        }

        // Switching operation type invalidates the spread resume state
        self.engine.clear();

        let generation = self.store.generation();
        let iters = max_iters.unwrap_or(self.config.propagation.distance_iters);
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || engine.diffuse_distance(&seed_mask, iters))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))??;

        match outcome {
            DiffusionOutcome::NotReady => Ok(CommandStatus::NotReady),
            DiffusionOutcome::Complete(values) => {
                if self.store.generation() != generation {
                    warn!("Discarding stale distance field");
                    return Ok(CommandStatus::Stale);
                }
                self.store.set_activation("session", values)?;
                self.broadcaster
                    .publish_classification(&self.store.classification(), self.store.activation());
                Ok(CommandStatus::Applied { adopted: 0 })
            }
        }
    }

    /// Initialize or refine the cached embedding with the current marks as
    /// the supervision signal.
    pub async fn embed(&mut self) -> Result<EmbeddingState, SessionError> {
        let reduction = &self.config.reduction;
        let state = self
            .cache
            .initialize(
                &self.dataset_id,
                reduction.target_dims,
                Arc::clone(&self.features),
                reduction.init,
            )
            .await?;
        if !state.stage.can_refine() {
            // Identity embeddings converge immediately
            return Ok(state);
        }

        let seeds = self.store.classification();
        let state = self
            .cache
            .refine(
                &self.dataset_id,
                reduction.target_dims,
                Arc::clone(&self.features),
                reduction.epochs,
                reduction.learning_rate,
                &seeds,
            )
            .await?;
        Ok(state)
    }

    /// The cached embedding for this session's target dimension, if any.
    pub fn embedding(&self) -> Option<EmbeddingState> {
        self.cache
            .get(&self.dataset_id, self.config.reduction.target_dims)
    }

    /// Rewind the cached embedding so the next refine starts fresh from the
    /// current layout.
    pub fn reset_embedding(&self) -> Result<EmbeddingState, SessionError> {
        Ok(self
            .cache
            .reset(&self.dataset_id, self.config.reduction.target_dims)?)
    }

    /// Drop the propagated classes without touching the graph.
    pub fn clear_spread(&self) {
        self.engine.clear();
    }

    /// Persist the labeling state as a flat keyed JSON record.
    pub fn save_project(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        ProjectRecord::from_store(&self.store).save(path)?;
        Ok(())
    }

    /// Restore labeling state saved by `save_project` and republish it.
    pub fn load_project(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let record = ProjectRecord::load(path)?;
        let store = record.into_store()?;
        if store.sample_count() != self.features.rows() {
            return Err(SessionError::Store(
                labelflow_store::StoreError::LengthMismatch {
                    expected: self.features.rows(),
                    actual: store.sample_count(),
                },
            ));
        }
        self.store = store;
        self.broadcaster
            .publish_classification(&self.store.classification(), self.store.activation());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use labelflow_broadcast::ListenerError;
    use labelflow_embedding::{FitParams, ReducerError, ReducerInit};
    use labelflow_types::Rgba;

    struct NoopReducer;

    impl Reducer for NoopReducer {
        fn name(&self) -> &str {
            "noop"
        }

        fn fit(
            &self,
            features: &FeatureMatrix,
            target_dims: usize,
            init: ReducerInit<'_>,
            _params: &FitParams,
        ) -> Result<Vec<f32>, ReducerError> {
            match init {
                ReducerInit::Resume(prev) => Ok(prev.to_vec()),
                ReducerInit::Method(_) => {
                    Ok(vec![0.0; features.rows() * target_dims])
                }
            }
        }
    }

    struct CountingListener {
        selections: Mutex<usize>,
        classifications: Mutex<usize>,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                selections: Mutex::new(0),
                classifications: Mutex::new(0),
            })
        }
    }

    impl ViewListener for CountingListener {
        fn on_selection(&self, _event: &SelectionEvent) -> Result<(), ListenerError> {
            *self.selections.lock().unwrap() += 1;
            Ok(())
        }

        fn on_classification_updated(
            &self,
            _classes: &[ClassId],
            _activation: Option<&[f32]>,
        ) -> Result<(), ListenerError> {
            *self.classifications.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn session() -> LabelSession {
        let features = FeatureMatrix::from_rows(
            (0..12).map(|i| vec![0.1 * i as f32, 0.0]).collect(),
        )
        .unwrap();
        let classes = ClassLabel::build_list(
            &[("a", Rgba::opaque(1.0, 0.0, 0.0)), ("b", Rgba::opaque(0.0, 1.0, 0.0))],
            None,
        );
        let config = SessionConfig::default();
        LabelSession::new("unit", features, classes, Arc::new(NoopReducer), config).unwrap()
    }

    #[test]
    fn test_handle_selection_marks_and_publishes() {
        let mut s = session();
        let listener = CountingListener::new();
        s.register_view("table", listener.clone());

        let delivered = s
            .handle_selection(&SelectionEvent::mark("points", vec![1, 2], 1))
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(s.store().assignment_of(1).unwrap(), 1);
        assert_eq!(*listener.selections.lock().unwrap(), 1);
    }

    #[test]
    fn test_plain_selection_is_transient() {
        let mut s = session();
        s.handle_selection(&SelectionEvent::select("points", vec![4]))
            .unwrap();
        assert_eq!(s.store().assignment_of(4).unwrap(), 0);
        assert!(s.store().current_marker().unwrap().is_transient());
    }

    #[test]
    fn test_undo_republishes() {
        let mut s = session();
        let listener = CountingListener::new();
        s.register_view("table", listener.clone());

        s.handle_selection(&SelectionEvent::mark("table", vec![1], 1))
            .unwrap();
        assert!(s.undo().is_some());
        assert_eq!(*listener.classifications.lock().unwrap(), 1);
        assert!(s.undo().is_none());
    }

    #[tokio::test]
    async fn test_spread_not_ready_before_build() {
        let mut s = session();
        let status = s.spread(None).await.unwrap();
        assert_eq!(status, CommandStatus::NotReady);
    }

    #[tokio::test]
    async fn test_color_by_distance_without_seeds() {
        let mut s = session();
        s.rebuild_graph().await.unwrap();
        let status = s.color_by_distance(None).await.unwrap();
        assert_eq!(status, CommandStatus::NoSeeds);
    }

    #[tokio::test]
    async fn test_project_round_trip() {
        let mut s = session();
        s.handle_selection(&SelectionEvent::mark("table", vec![2, 3], 2))
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("project.json");
        s.save_project(&path).unwrap();

        let mut restored = session();
        restored.load_project(&path).unwrap();
        assert_eq!(restored.store().assignment_of(2).unwrap(), 2);
        assert_eq!(restored.store().markers().len(), 1);
    }
}
