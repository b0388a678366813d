//! Model registry configuration types

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Which estimator a model artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Ordinary least squares over close/high/low
    Linear,
    /// Elastic-net regularized regression over close/high/low
    ElasticNet,
    /// Direction classifier (-1 / 0 / 1)
    Logistic,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Linear => write!(f, "linear"),
            ModelKind::ElasticNet => write!(f, "elastic_net"),
            ModelKind::Logistic => write!(f, "logistic"),
        }
    }
}

/// One registered model: its stream name, estimator kind and artifact path
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Stream name, also the SSE route (`/info`, `/lgr`, ...)
    pub name: String,
    pub kind: ModelKind,
    pub path: PathBuf,
}
