//! # labelflow-graph
//!
//! Similarity-graph construction and label propagation.
//!
//! This crate spreads sparse class marks across a k-nearest-neighbor graph
//! and produces a continuous activation-distance field from a seed set.
//!
//! ## Features
//! - Symmetrized k-NN graph over the sample feature matrix
//! - Exact neighbor scan for small datasets, usearch HNSW above a threshold
//! - Iterative inverse-distance-weighted label spreading with resume
//! - Min-plus distance diffusion for proximity coloring
//! - Asynchronous rebuilds that cancel and restart in-flight spreads

pub mod engine;
pub mod error;
pub mod graph;
pub mod propagate;

pub use engine::{DiffusionOutcome, PropagationEngine, PropagationOutcome};
pub use error::GraphError;
pub use graph::{Edge, SimilarityGraph};
pub use propagate::PropagationResult;
