//! End-to-end test infrastructure for labelflow.
//!
//! Provides a shared `TestHarness` and helper views/reducers for tests
//! covering the full mark -> spread -> broadcast -> embed flow.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use labelflow_broadcast::{ListenerError, ViewListener};
use labelflow_embedding::{FitParams, Reducer, ReducerError, ReducerInit};
use labelflow_session::LabelSession;
use labelflow_types::{
    ClassId, ClassLabel, FeatureMatrix, Rgba, SelectionEvent, SessionConfig,
};

/// Number of samples in the tight cluster near the origin.
pub const NEAR_CLUSTER: usize = 6;
/// Number of samples in the distant cluster.
pub const FAR_CLUSTER: usize = 94;

/// Shared test harness for E2E tests.
///
/// Wires a 100-sample two-cluster dataset into a full session: pids
/// `0..NEAR_CLUSTER` sit 0.1 apart near the origin, the rest sit far away,
/// so no k-NN edge crosses the gap.
pub struct TestHarness {
    pub session: LabelSession,
}

impl TestHarness {
    /// Create a harness; the similarity graph is not built yet.
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let config = SessionConfig::default();
        let config = SessionConfig {
            propagation: config.propagation.with_n_neighbors(3),
            reduction: config.reduction.with_target_dims(1).with_epochs(1),
        };
        let session = LabelSession::new(
            "e2e",
            two_cluster_features(NEAR_CLUSTER, FAR_CLUSTER),
            default_classes(),
            Arc::new(DriftReducer::default()),
            config,
        )
        .expect("Failed to create session");
        Self { session }
    }

    /// Create a harness with the similarity graph already built.
    pub async fn with_graph() -> Self {
        let harness = Self::new();
        harness
            .session
            .rebuild_graph()
            .await
            .expect("Failed to build graph");
        harness
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Two well-separated clusters in 2-D: `near` points spaced 0.1 apart at the
/// origin, `far` points likewise around x = 50.
pub fn two_cluster_features(near: usize, far: usize) -> FeatureMatrix {
    let mut rows = Vec::with_capacity(near + far);
    for i in 0..near {
        rows.push(vec![0.1 * i as f32, 0.0]);
    }
    for i in 0..far {
        rows.push(vec![50.0 + 0.1 * i as f32, 0.0]);
    }
    FeatureMatrix::from_rows(rows).expect("Failed to build features")
}

/// Unlabeled + two user classes.
pub fn default_classes() -> Vec<ClassLabel> {
    ClassLabel::build_list(
        &[
            ("alpha", Rgba::opaque(1.0, 0.0, 0.0)),
            ("beta", Rgba::opaque(0.0, 0.0, 1.0)),
        ],
        None,
    )
}

/// Deterministic stand-in for the external reducer.
///
/// Fresh layouts come from a fixed-seed RNG; resumed layouts creep by
/// `epochs * learning_rate * drift` per coordinate, so incremental
/// refinement is observable in tests.
pub struct DriftReducer {
    pub drift: f32,
}

impl Default for DriftReducer {
    fn default() -> Self {
        Self { drift: 0.01 }
    }
}

impl Reducer for DriftReducer {
    fn name(&self) -> &str {
        "drift"
    }

    fn fit(
        &self,
        features: &FeatureMatrix,
        target_dims: usize,
        init: ReducerInit<'_>,
        params: &FitParams,
    ) -> Result<Vec<f32>, ReducerError> {
        match init {
            ReducerInit::Method(_) => {
                let mut rng = StdRng::seed_from_u64(7);
                Ok((0..features.rows() * target_dims)
                    .map(|_| rng.random_range(0.0..1.0))
                    .collect())
            }
            ReducerInit::Resume(prev) => {
                let delta = params.epochs as f32 * params.learning_rate * self.drift;
                Ok(prev.iter().map(|v| v + delta).collect())
            }
        }
    }
}

/// Records everything it receives, optionally ignoring its own echoes.
pub struct RecordingView {
    name: String,
    events: Mutex<Vec<SelectionEvent>>,
    updates: Mutex<Vec<Vec<ClassId>>>,
}

impl RecordingView {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<SelectionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<Vec<ClassId>> {
        self.updates.lock().unwrap().clone()
    }
}

impl ViewListener for RecordingView {
    fn on_selection(&self, event: &SelectionEvent) -> Result<(), ListenerError> {
        // Suppress our own echo; the broadcast includes the source view
        if event.is_from(&self.name) {
            return Ok(());
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn on_classification_updated(
        &self,
        classes: &[ClassId],
        _activation: Option<&[f32]>,
    ) -> Result<(), ListenerError> {
        self.updates.lock().unwrap().push(classes.to_vec());
        Ok(())
    }
}

/// Always fails; used to prove listener isolation.
pub struct FailingView;

impl ViewListener for FailingView {
    fn on_selection(&self, _event: &SelectionEvent) -> Result<(), ListenerError> {
        Err(ListenerError::failed("selection handler exploded"))
    }

    fn on_classification_updated(
        &self,
        _classes: &[ClassId],
        _activation: Option<&[f32]>,
    ) -> Result<(), ListenerError> {
        Err(ListenerError::failed("classification handler exploded"))
    }
}
