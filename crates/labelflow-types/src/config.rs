//! Configuration loading for labelflow.
//!
//! Layered precedence: built-in defaults -> config file
//! (`~/.config/labelflow/config.toml`) -> environment variables
//! (`LABELFLOW_*`, `__` as the section separator).

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CoreError;

/// Initialization method for a fresh embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitMethod {
    /// Random layout
    #[default]
    Random,
    /// Spectral layout derived from the similarity graph
    Spectral,
}

impl std::fmt::Display for InitMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitMethod::Random => write!(f, "random"),
            InitMethod::Spectral => write!(f, "spectral"),
        }
    }
}

/// Settings for similarity-graph construction and label propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Neighbors per node in the k-NN graph
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,

    /// Default relaxation iterations for a spread command
    #[serde(default = "default_spread_iters")]
    pub spread_iters: usize,

    /// Default relaxation iterations for a distance diffusion
    #[serde(default = "default_distance_iters")]
    pub distance_iters: usize,

    /// Minimum aggregate neighbor weight required to adopt a class
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Sample count above which neighbor search switches from an exact scan
    /// to the HNSW index
    #[serde(default = "default_exact_knn_limit")]
    pub exact_knn_limit: usize,
}

fn default_n_neighbors() -> usize {
    8
}

fn default_spread_iters() -> usize {
    1
}

fn default_distance_iters() -> usize {
    100
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_exact_knn_limit() -> usize {
    4096
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            spread_iters: default_spread_iters(),
            distance_iters: default_distance_iters(),
            confidence_threshold: default_confidence_threshold(),
            exact_knn_limit: default_exact_knn_limit(),
        }
    }
}

impl PropagationConfig {
    pub fn with_n_neighbors(mut self, k: usize) -> Self {
        self.n_neighbors = k;
        self
    }

    pub fn with_spread_iters(mut self, iters: usize) -> Self {
        self.spread_iters = iters;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_exact_knn_limit(mut self, limit: usize) -> Self {
        self.exact_knn_limit = limit;
        self
    }
}

/// Settings for the incremental dimensionality reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Target embedding dimension
    #[serde(default = "default_target_dims")]
    pub target_dims: usize,

    /// Epochs per refinement pass
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Reducer learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Layout initialization for a fresh embedding
    #[serde(default)]
    pub init: InitMethod,

    /// Epochs for the low-cost bootstrap pass
    #[serde(default = "default_bootstrap_epochs")]
    pub bootstrap_epochs: usize,
}

fn default_target_dims() -> usize {
    3
}

fn default_epochs() -> usize {
    100
}

fn default_learning_rate() -> f32 {
    0.25
}

fn default_bootstrap_epochs() -> usize {
    1
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            target_dims: default_target_dims(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            init: InitMethod::default(),
            bootstrap_epochs: default_bootstrap_epochs(),
        }
    }
}

impl ReductionConfig {
    pub fn with_target_dims(mut self, dims: usize) -> Self {
        self.target_dims = dims;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub propagation: PropagationConfig,

    #[serde(default)]
    pub reduction: ReductionConfig,
}

impl SessionConfig {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (`~/.config/labelflow/config.toml`)
    /// 3. Explicit config file path (optional, higher precedence)
    /// 4. Environment variables (`LABELFLOW_*`)
    pub fn load(explicit_path: Option<&str>) -> Result<Self, CoreError> {
        let config_dir = ProjectDirs::from("", "", "labelflow")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = explicit_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: LABELFLOW_PROPAGATION__N_NEIGHBORS, LABELFLOW_REDUCTION__EPOCHS, ...
        builder = builder.add_source(
            Environment::with_prefix("LABELFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.propagation.n_neighbors, 8);
        assert_eq!(cfg.propagation.spread_iters, 1);
        assert_eq!(cfg.propagation.distance_iters, 100);
        assert_eq!(cfg.reduction.target_dims, 3);
        assert_eq!(cfg.reduction.epochs, 100);
        assert_eq!(cfg.reduction.bootstrap_epochs, 1);
        assert_eq!(cfg.reduction.init, InitMethod::Random);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[propagation]\nn_neighbors = 12\n").unwrap();
        writeln!(f, "[reduction]\ntarget_dims = 2\ninit = \"spectral\"\n").unwrap();

        let cfg = SessionConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.propagation.n_neighbors, 12);
        // Untouched fields keep their defaults
        assert_eq!(cfg.propagation.distance_iters, 100);
        assert_eq!(cfg.reduction.target_dims, 2);
        assert_eq!(cfg.reduction.init, InitMethod::Spectral);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(SessionConfig::load(Some("/nonexistent/labelflow.toml")).is_err());
    }

    #[test]
    fn test_builders() {
        let cfg = PropagationConfig::default()
            .with_n_neighbors(4)
            .with_confidence_threshold(0.25);
        assert_eq!(cfg.n_neighbors, 4);
        assert!((cfg.confidence_threshold - 0.25).abs() < f32::EPSILON);
    }
}
