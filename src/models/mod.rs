//! Prediction models - pre-trained smartcore artifacts
//!
//! Artifacts are JSON files holding a serialized smartcore model plus an
//! optional standard scaler applied to the feature vector first.

mod linear;

pub use linear::{DirectionClassifier, ElasticRegressor, LinearRegressor, RegressorArtifact};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::config::{ModelConfig, ModelKind};
use crate::error::{ObserverError, Result};

/// Raw model output before sentiment adjustment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawPrediction {
    Continuous { close: f64, high: f64, low: f64 },
    /// -1 down, 0 flat, 1 up
    Direction(f64),
}

/// A loaded, ready-to-predict model
#[cfg_attr(test, mockall::automock)]
pub trait Model: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Predict from one feature vector ordered as `Observation::feature_names()`
    fn predict(&self, features: &[f64]) -> Result<RawPrediction>;
}

/// Per-feature standardization, `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.mean.len() || features.len() != self.scale.len() {
            return Err(ObserverError::Model(format!(
                "scaler expects {} features, got {}",
                self.mean.len(),
                features.len()
            )));
        }

        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Constant features keep a unit scale
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

pub(crate) fn scaled(scaler: &Option<Scaler>, features: &[f64]) -> Result<Vec<f64>> {
    match scaler {
        Some(s) => s.transform(features),
        None => Ok(features.to_vec()),
    }
}

/// Load the artifact described by `config`
pub fn load_model(config: &ModelConfig) -> Result<Arc<dyn Model>> {
    let model: Arc<dyn Model> = match config.kind {
        ModelKind::Linear => Arc::new(LinearRegressor::load(&config.path)?),
        ModelKind::ElasticNet => Arc::new(ElasticRegressor::load(&config.path)?),
        ModelKind::Logistic => Arc::new(DirectionClassifier::load(&config.path)?),
    };

    tracing::info!(
        model = %config.name,
        kind = %config.kind,
        path = %config.path.display(),
        "Model loaded"
    );

    Ok(model)
}

pub(crate) fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ObserverError::Model(format!("cannot read {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&raw)
        .map_err(|e| ObserverError::Model(format!("invalid artifact {}: {}", path.display(), e)))
}
