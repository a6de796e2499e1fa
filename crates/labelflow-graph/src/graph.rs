//! The k-nearest-neighbor similarity graph.
//!
//! Built once per (dataset, feature-space) pair and invalidated only when
//! the underlying feature space changes. Small datasets use an exact O(N²)
//! neighbor scan; larger ones go through a usearch HNSW index.

use std::collections::BTreeMap;

use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use labelflow_types::{FeatureMatrix, SampleId};

use crate::error::GraphError;

/// One directed edge of the similarity graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Neighbor sample id
    pub target: SampleId,
    /// Euclidean distance to the neighbor
    pub weight: f32,
}

/// Symmetrized k-NN graph over sample feature vectors.
///
/// Per-node neighbor lists are sorted by (distance, id) so traversal order
/// is deterministic.
#[derive(Debug, Clone)]
pub struct SimilarityGraph {
    k: usize,
    neighbors: Vec<Vec<Edge>>,
}

impl SimilarityGraph {
    /// Build the graph.
    ///
    /// Fails if `N < k + 1` or if any sample's feature row contains
    /// non-finite values (such a node would have no valid neighbors).
    pub fn build(
        features: &FeatureMatrix,
        k: usize,
        exact_limit: usize,
    ) -> Result<Self, GraphError> {
        let n = features.rows();
        if n < k + 1 {
            return Err(GraphError::TooFewSamples { n, k });
        }
        for (pid, row) in features.iter_rows().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(GraphError::NonFiniteFeatures { pid });
            }
        }

        let directed = if n <= exact_limit {
            debug!(n, k, "Building k-NN graph via exact scan");
            exact_knn(features, k)
        } else {
            debug!(n, k, "Building k-NN graph via HNSW index");
            hnsw_knn(features, k)?
        };

        let neighbors = symmetrize(directed);
        let edge_count: usize = neighbors.iter().map(Vec::len).sum();
        info!(n, k, edges = edge_count, "Similarity graph built");

        Ok(Self { k, neighbors })
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Neighbor count requested at build time.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Outgoing edges of one node, sorted by (distance, id).
    pub fn neighbors(&self, pid: SampleId) -> &[Edge] {
        &self.neighbors[pid]
    }

    /// Total directed edge count after symmetrization.
    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum()
    }
}

pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Exact k-NN by full pairwise scan.
fn exact_knn(features: &FeatureMatrix, k: usize) -> Vec<Vec<Edge>> {
    let n = features.rows();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let row = features.row(i);
        let mut dists: Vec<Edge> = (0..n)
            .filter(|&j| j != i)
            .map(|j| Edge {
                target: j,
                weight: euclidean(row, features.row(j)),
            })
            .collect();
        dists.sort_by(|a, b| {
            a.weight
                .total_cmp(&b.weight)
                .then_with(|| a.target.cmp(&b.target))
        });
        dists.truncate(k);
        out.push(dists);
    }
    out
}

/// Approximate k-NN through a usearch HNSW index.
fn hnsw_knn(features: &FeatureMatrix, k: usize) -> Result<Vec<Vec<Edge>>, GraphError> {
    let options = IndexOptions {
        dimensions: features.cols(),
        metric: MetricKind::L2sq,
        quantization: ScalarKind::F32,
        connectivity: 16,
        expansion_add: 200,
        expansion_search: 100,
        multi: false,
    };

    let index = Index::new(&options).map_err(|e| GraphError::Index(e.to_string()))?;
    index
        .reserve(features.rows())
        .map_err(|e| GraphError::Index(e.to_string()))?;

    for (pid, row) in features.iter_rows().enumerate() {
        index
            .add(pid as u64, row)
            .map_err(|e| GraphError::Index(e.to_string()))?;
    }

    let mut out = Vec::with_capacity(features.rows());
    for (pid, row) in features.iter_rows().enumerate() {
        // k + 1 because the query point itself comes back as its own nearest hit
        let matches = index
            .search(row, k + 1)
            .map_err(|e| GraphError::Index(e.to_string()))?;

        let mut edges: Vec<Edge> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter(|(&key, _)| key as usize != pid)
            .map(|(&key, &dist)| Edge {
                target: key as usize,
                // L2sq distances come back squared
                weight: dist.max(0.0).sqrt(),
            })
            .collect();
        edges.truncate(k);
        out.push(edges);
    }
    Ok(out)
}

/// Insert reverse edges so the adjacency is undirected, then sort each
/// neighbor list by (distance, id).
fn symmetrize(directed: Vec<Vec<Edge>>) -> Vec<Vec<Edge>> {
    let n = directed.len();
    let mut adjacency: Vec<BTreeMap<SampleId, f32>> = vec![BTreeMap::new(); n];
    for (i, edges) in directed.iter().enumerate() {
        for e in edges {
            adjacency[i].entry(e.target).or_insert(e.weight);
            adjacency[e.target].entry(i).or_insert(e.weight);
        }
    }
    adjacency
        .into_iter()
        .map(|m| {
            let mut edges: Vec<Edge> = m
                .into_iter()
                .map(|(target, weight)| Edge { target, weight })
                .collect();
            edges.sort_by(|a, b| {
                a.weight
                    .total_cmp(&b.weight)
                    .then_with(|| a.target.cmp(&b.target))
            });
            edges
        })
        .collect()
}
