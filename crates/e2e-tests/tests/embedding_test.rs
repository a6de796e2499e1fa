//! End-to-end embedding tests: incremental refinement, the identity fast
//! path, and cache invalidation on graph rebuilds.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{two_cluster_features, DriftReducer, TestHarness};
use labelflow_embedding::{EmbeddingCache, RefinementStage};
use labelflow_session::LabelSession;
use labelflow_types::{ReductionConfig, SelectionEvent, SessionConfig};

/// refine never discards the prior embedding: after refine(1 epoch)
/// producing E1, refine(0 epochs) returns a state equal to E1, not a
/// freshly bootstrapped embedding.
#[tokio::test]
async fn test_refine_zero_epochs_keeps_previous_state() {
    let features = Arc::new(two_cluster_features(6, 14));
    let cache = EmbeddingCache::new(
        Arc::new(DriftReducer::default()),
        ReductionConfig::default().with_target_dims(1),
    );

    let e0 = cache
        .initialize("e2e", 1, Arc::clone(&features), Default::default())
        .await
        .unwrap();
    let e1 = cache
        .refine("e2e", 1, Arc::clone(&features), 1, 0.25, &[])
        .await
        .unwrap();
    assert_ne!(e0.vectors, e1.vectors);

    let e2 = cache
        .refine("e2e", 1, Arc::clone(&features), 0, 0.25, &[])
        .await
        .unwrap();
    assert_eq!(e2, e1);
}

/// Repeated embed commands continue from the previous layout instead of
/// restarting: the drift reducer shifts every coordinate by a fixed delta
/// per refine, which is only visible if the prior vectors are reused.
#[tokio::test]
async fn test_embed_is_incremental_across_commands() {
    let mut harness = TestHarness::new();
    let first = harness.session.embed().await.unwrap();
    assert_eq!(first.stage, RefinementStage::Refining);

    let second = harness.session.embed().await.unwrap();
    // epochs = 1, learning_rate = 0.25, drift = 0.01
    let delta = 0.25 * 0.01;
    for (a, b) in first.vectors.iter().zip(second.vectors.iter()) {
        assert!((b - a - delta).abs() < 1e-6);
    }
}

/// When the target dimension covers the feature width, the embedding is
/// the identity map and converges immediately.
#[tokio::test]
async fn test_identity_embedding_when_no_reduction_needed() {
    let features = two_cluster_features(6, 14);
    let config = SessionConfig {
        propagation: Default::default(),
        reduction: ReductionConfig::default().with_target_dims(8),
    };
    let mut session = LabelSession::new(
        "identity",
        features.clone(),
        e2e_tests::default_classes(),
        Arc::new(DriftReducer::default()),
        config,
    )
    .unwrap();

    let state = session.embed().await.unwrap();
    assert_eq!(state.stage, RefinementStage::Converged);
    assert_eq!(state.target_dims, 2);
    assert_eq!(state.vectors, features.as_slice());

    // Embedding again stays converged and does not refit
    let again = session.embed().await.unwrap();
    assert_eq!(again, state);
}

/// Rebuilding the similarity graph invalidates the cached embedding; the
/// next embed starts from a fresh bootstrap.
#[tokio::test]
async fn test_graph_rebuild_invalidates_embedding() {
    let mut harness = TestHarness::new();
    harness.session.embed().await.unwrap();
    assert!(harness.session.embedding().is_some());

    harness.session.rebuild_graph().await.unwrap();
    assert!(harness.session.embedding().is_none());
}

/// Marks flow into the refine call as the supervision seed.
#[tokio::test]
async fn test_embed_after_marks_still_refines() {
    let mut harness = TestHarness::new();
    harness
        .session
        .handle_selection(&SelectionEvent::mark("table", vec![1, 2], 1))
        .unwrap();

    let state = harness.session.embed().await.unwrap();
    assert_eq!(state.stage, RefinementStage::Refining);
    assert_eq!(state.sample_count, 100);
}

/// Reset rewinds the stage but keeps the refined layout.
#[tokio::test]
async fn test_reset_keeps_layout() {
    let mut harness = TestHarness::new();
    let refined = harness.session.embed().await.unwrap();

    let reset = harness.session.reset_embedding().unwrap();
    assert_eq!(reset.stage, RefinementStage::Initialized);
    assert_eq!(reset.vectors, refined.vectors);
}
