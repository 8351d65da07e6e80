//! Logistic-regression inference.
//!
//! The trained classifier is shipped as a JSON weights file and treated as a
//! black box by the rest of the system: one operation, five features in, a
//! binary outcome out. A missing model is not fatal at startup; prediction
//! requests surface the condition to the caller instead.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::storage::Outcome;

/// Number of gene-expression features the classifier expects.
pub const FEATURE_COUNT: usize = 5;

/// Errors from loading a model file.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model has {got} weights, expected {FEATURE_COUNT}")]
    WeightCount { got: usize },
}

impl ModelError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A trained binary classifier.
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    weights: Vec<f64>,
    intercept: f64,
}

impl Model {
    /// Load a model from a JSON weights file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        let model: Self = serde_json::from_str(&content).map_err(|e| ModelError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if model.weights.len() != FEATURE_COUNT {
            return Err(ModelError::WeightCount {
                got: model.weights.len(),
            });
        }
        Ok(model)
    }

    /// Candidate locations for the weights file, configured path first.
    pub fn candidate_paths(configured: &Path) -> Vec<PathBuf> {
        let mut paths = vec![configured.to_path_buf()];
        for fallback in ["models/model.json", "model.json"] {
            let p = PathBuf::from(fallback);
            if !paths.contains(&p) {
                paths.push(p);
            }
        }
        paths
    }

    /// Try each candidate path in order; `None` if all fail.
    pub fn load_first(paths: &[PathBuf]) -> Option<Self> {
        for path in paths {
            match Self::load(path) {
                Ok(model) => {
                    tracing::info!(path = %path.display(), "model loaded");
                    return Some(model);
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "model load attempt failed");
                }
            }
        }
        tracing::warn!(?paths, "model not found in any expected location");
        None
    }

    /// Classify one feature vector.
    pub fn predict(&self, genes: &[f64; FEATURE_COUNT]) -> Outcome {
        let z: f64 = self
            .weights
            .iter()
            .zip(genes)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        let probability = 1.0 / (1.0 + (-z).exp());
        if probability >= 0.5 {
            Outcome::Positive
        } else {
            Outcome::Negative
        }
    }
}
