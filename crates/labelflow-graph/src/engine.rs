//! The propagation engine.
//!
//! Owns the similarity graph and runs spreads and distance diffusions over
//! it. Graph construction is the expensive operation and may run on a
//! blocking worker; a rebuild bumps the graph epoch, which cancels any
//! in-flight spread so it restarts against the new graph once installed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use labelflow_types::{ClassId, FeatureMatrix, PropagationConfig, UNCLASSIFIED};

use crate::error::GraphError;
use crate::graph::SimilarityGraph;
use crate::propagate::{relax_classes, relax_distance, seed_distances, PropagationResult};

/// Result of a spread request.
///
/// `NotReady` means no graph is installed yet (asynchronous construction in
/// progress); callers retry later rather than treating it as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PropagationOutcome {
    Complete(PropagationResult),
    NotReady,
}

/// Result of a distance diffusion request.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffusionOutcome {
    Complete(Vec<f32>),
    NotReady,
}

/// Label-propagation engine over one dataset's similarity graph.
pub struct PropagationEngine {
    config: PropagationConfig,
    graph: RwLock<Option<Arc<SimilarityGraph>>>,
    /// Classes from the previous spread; consecutive spreads resume from it
    last_classes: RwLock<Option<Vec<ClassId>>>,
    /// Bumped when a build starts and when a graph is installed
    epoch: AtomicU64,
    building: AtomicBool,
}

impl PropagationEngine {
    pub fn new(config: PropagationConfig) -> Self {
        Self {
            config,
            graph: RwLock::new(None),
            last_classes: RwLock::new(None),
            epoch: AtomicU64::new(0),
            building: AtomicBool::new(false),
        }
    }

    /// The currently installed graph, if any.
    pub fn graph(&self) -> Option<Arc<SimilarityGraph>> {
        self.graph.read().unwrap().clone()
    }

    /// True while an asynchronous build is running.
    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::SeqCst)
    }

    /// True when a graph is installed and no build is running.
    pub fn is_ready(&self) -> bool {
        !self.is_building() && self.graph.read().unwrap().is_some()
    }

    /// Build and install the graph on the calling thread.
    ///
    /// Starting a build cancels any in-flight spread; a failed build leaves
    /// the previous graph installed.
    pub fn build(&self, features: &FeatureMatrix) -> Result<(), GraphError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.building.store(true, Ordering::SeqCst);

        match SimilarityGraph::build(
            features,
            self.config.n_neighbors,
            self.config.exact_knn_limit,
        ) {
            Ok(graph) => {
                self.install(graph);
                Ok(())
            }
            Err(e) => {
                self.building.store(false, Ordering::SeqCst);
                warn!(error = %e, "Graph build failed");
                Err(e)
            }
        }
    }

    /// Kick off a build on a blocking worker and return its handle.
    pub fn begin_rebuild(
        self: &Arc<Self>,
        features: Arc<FeatureMatrix>,
    ) -> JoinHandle<Result<(), GraphError>> {
        info!(
            n = features.rows(),
            k = self.config.n_neighbors,
            "Starting background graph build"
        );
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || engine.build(&features))
    }

    fn install(&self, graph: SimilarityGraph) {
        *self.graph.write().unwrap() = Some(Arc::new(graph));
        *self.last_classes.write().unwrap() = None;
        self.building.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the propagated classes without discarding the graph.
    ///
    /// Relabeling is cheap; the graph rebuild is not.
    pub fn clear(&self) {
        *self.last_classes.write().unwrap() = None;
        debug!("Cleared propagation state");
    }

    /// Spread the seed classes over the graph.
    ///
    /// Seed (non-zero) entries never change; unlabeled nodes adopt the
    /// inverse-distance-weighted majority class of their labeled neighbors
    /// once it clears the confidence threshold. Consecutive spreads resume
    /// from the previous propagated state. Stops at convergence or after
    /// `max_iters` passes. Also relaxes the activation-distance field from
    /// the seed set within the same iteration budget.
    pub fn spread(
        &self,
        seed: &[ClassId],
        max_iters: usize,
    ) -> Result<PropagationOutcome, GraphError> {
        'restart: loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let graph = match self.graph() {
                Some(graph) => graph,
                None => return Ok(PropagationOutcome::NotReady),
            };
            if seed.len() != graph.node_count() {
                return Err(GraphError::LengthMismatch {
                    expected: graph.node_count(),
                    actual: seed.len(),
                });
            }

            let seeded: Vec<bool> = seed.iter().map(|&c| c != UNCLASSIFIED).collect();

            // Resume: keep prior adoptions for unlabeled nodes, reassert seeds
            let mut classes: Vec<ClassId> = match &*self.last_classes.read().unwrap() {
                Some(prev) if prev.len() == seed.len() => seed
                    .iter()
                    .zip(prev.iter())
                    .map(|(&s, &p)| if s != UNCLASSIFIED { s } else { p })
                    .collect(),
                _ => seed.to_vec(),
            };

            let mut activation = seed_distances(&seeded);
            let mut classes_done = false;
            let mut activation_done = false;

            for _ in 0..max_iters {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    debug!("Graph changed mid-spread; restarting");
                    continue 'restart;
                }
                if !classes_done {
                    let (next, changed) = relax_classes(
                        &graph,
                        &classes,
                        &seeded,
                        self.config.confidence_threshold,
                    );
                    classes = next;
                    classes_done = !changed;
                }
                if !activation_done {
                    let (next, changed) = relax_distance(&graph, &activation);
                    activation = next;
                    activation_done = !changed;
                }
                if classes_done && activation_done {
                    break;
                }
            }

            *self.last_classes.write().unwrap() = Some(classes.clone());
            let labeled = classes.iter().filter(|&&c| c != UNCLASSIFIED).count();
            debug!(labeled, total = classes.len(), "Spread complete");

            return Ok(PropagationOutcome::Complete(PropagationResult {
                classes,
                activation,
            }));
        }
    }

    /// Diffuse a distance field outward from the seed set.
    ///
    /// Each pass sets `v[i] = min(v[i], min_j(v[j] + w_ij))`; unreachable
    /// nodes stay at `f32::INFINITY`.
    pub fn diffuse_distance(
        &self,
        seed_mask: &[bool],
        max_iters: usize,
    ) -> Result<DiffusionOutcome, GraphError> {
        'restart: loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let graph = match self.graph() {
                Some(graph) => graph,
                None => return Ok(DiffusionOutcome::NotReady),
            };
            if seed_mask.len() != graph.node_count() {
                return Err(GraphError::LengthMismatch {
                    expected: graph.node_count(),
                    actual: seed_mask.len(),
                });
            }

            let mut values = seed_distances(seed_mask);
            for _ in 0..max_iters {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    debug!("Graph changed mid-diffusion; restarting");
                    continue 'restart;
                }
                let (next, changed) = relax_distance(&graph, &values);
                values = next;
                if !changed {
                    break;
                }
            }

            return Ok(DiffusionOutcome::Complete(values));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelflow_types::FeatureMatrix;

    fn two_cluster_features() -> FeatureMatrix {
        // Six tight points near the origin, six far away
        let mut rows = Vec::new();
        for i in 0..6 {
            rows.push(vec![0.1 * i as f32, 0.0]);
        }
        for i in 0..6 {
            rows.push(vec![50.0 + 0.1 * i as f32, 0.0]);
        }
        FeatureMatrix::from_rows(rows).unwrap()
    }

    fn engine_with_graph(k: usize) -> PropagationEngine {
        let engine = PropagationEngine::new(PropagationConfig::default().with_n_neighbors(k));
        engine.build(&two_cluster_features()).unwrap();
        engine
    }

    #[test]
    fn test_spread_not_ready_without_graph() {
        let engine = PropagationEngine::new(PropagationConfig::default());
        let outcome = engine.spread(&[0, 0, 0], 5).unwrap();
        assert_eq!(outcome, PropagationOutcome::NotReady);
    }

    #[test]
    fn test_spread_fills_cluster_and_leaves_rest() {
        let engine = engine_with_graph(3);
        let mut seed = vec![0; 12];
        seed[1] = 1;
        seed[2] = 1;

        let outcome = engine.spread(&seed, 5).unwrap();
        let PropagationOutcome::Complete(result) = outcome else {
            panic!("expected completed spread");
        };
        for pid in 0..6 {
            assert_eq!(result.classes[pid], 1, "pid {} should join class 1", pid);
        }
        for pid in 6..12 {
            assert_eq!(result.classes[pid], 0, "pid {} should stay unlabeled", pid);
        }
        // Activation is finite in the seeded cluster, unreachable across the gap
        assert!(result.activation[5].is_finite());
        assert!(result.activation[6].is_infinite());
    }

    #[test]
    fn test_spread_idempotent_once_converged() {
        let engine = engine_with_graph(3);
        let mut seed = vec![0; 12];
        seed[0] = 1;

        let first = engine.spread(&seed, 50).unwrap();
        let second = engine.spread(&seed, 50).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_spread_length_mismatch() {
        let engine = engine_with_graph(3);
        let err = engine.spread(&[0, 1], 5).unwrap_err();
        assert!(matches!(
            err,
            GraphError::LengthMismatch {
                expected: 12,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_clear_drops_resume_state() {
        let engine = engine_with_graph(3);
        let mut seed = vec![0; 12];
        seed[0] = 1;
        engine.spread(&seed, 50).unwrap();

        engine.clear();
        // With an empty seed and no resume state, nothing spreads
        let outcome = engine.spread(&vec![0; 12], 5).unwrap();
        let PropagationOutcome::Complete(result) = outcome else {
            panic!("expected completed spread");
        };
        assert!(result.classes.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_diffuse_distance_monotone_with_hops() {
        // Chain: A(0) - B(1) - C(2), then a gap
        let features =
            FeatureMatrix::from_rows(vec![vec![0.0], vec![1.0], vec![2.0], vec![30.0]]).unwrap();
        let engine = PropagationEngine::new(PropagationConfig::default().with_n_neighbors(1));
        engine.build(&features).unwrap();

        let outcome = engine
            .diffuse_distance(&[true, false, false, false], 100)
            .unwrap();
        let DiffusionOutcome::Complete(values) = outcome else {
            panic!("expected completed diffusion");
        };
        assert_eq!(values[0], 0.0);
        assert!(values[0] <= values[1]);
        assert!(values[1] <= values[2]);
    }

    #[test]
    fn test_rebuild_resets_resume_state() {
        let engine = engine_with_graph(3);
        let mut seed = vec![0; 12];
        seed[0] = 1;
        engine.spread(&seed, 50).unwrap();

        engine.build(&two_cluster_features()).unwrap();
        assert!(engine.last_classes.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_begin_rebuild_installs_graph() {
        let engine = Arc::new(PropagationEngine::new(
            PropagationConfig::default().with_n_neighbors(3),
        ));
        let handle = engine.begin_rebuild(Arc::new(two_cluster_features()));
        handle.await.unwrap().unwrap();
        assert!(engine.is_ready());

        let outcome = engine.spread(&vec![0; 12], 1).unwrap();
        assert!(matches!(outcome, PropagationOutcome::Complete(_)));
    }

    #[tokio::test]
    async fn test_begin_rebuild_propagates_build_errors() {
        let engine = Arc::new(PropagationEngine::new(
            PropagationConfig::default().with_n_neighbors(8),
        ));
        let tiny = Arc::new(FeatureMatrix::from_rows(vec![vec![0.0], vec![1.0]]).unwrap());
        let result = engine.begin_rebuild(tiny).await.unwrap();
        assert!(matches!(result, Err(GraphError::TooFewSamples { .. })));
        assert!(!engine.is_building());
    }
}
