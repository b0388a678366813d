//! Linear, elastic-net and logistic models using SmartCore

use serde::{Deserialize, Serialize};
use smartcore::error::Failed;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::elastic_net::ElasticNet;
use smartcore::linear::linear_regression::LinearRegression;
use smartcore::linear::logistic_regression::LogisticRegression;
use std::path::Path;

use crate::config::ModelKind;
use crate::error::{ObserverError, Result};
use crate::models::{read_artifact, scaled, Model, RawPrediction, Scaler};

type LinReg = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type ElasticReg = ElasticNet<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type LogReg = LogisticRegression<f64, i64, DenseMatrix<f64>, Vec<i64>>;

/// Single-target regression used for each of close/high/low
pub trait SingleTarget {
    fn predict_rows(&self, x: &DenseMatrix<f64>) -> std::result::Result<Vec<f64>, Failed>;
}

impl SingleTarget for LinReg {
    fn predict_rows(&self, x: &DenseMatrix<f64>) -> std::result::Result<Vec<f64>, Failed> {
        self.predict(x)
    }
}

impl SingleTarget for ElasticReg {
    fn predict_rows(&self, x: &DenseMatrix<f64>) -> std::result::Result<Vec<f64>, Failed> {
        self.predict(x)
    }
}

/// One regressor per target, sharing a scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressorArtifact<M> {
    #[serde(default)]
    pub scaler: Option<Scaler>,
    pub close: M,
    pub high: M,
    pub low: M,
}

impl<M: SingleTarget> RegressorArtifact<M> {
    fn predict(&self, features: &[f64]) -> Result<RawPrediction> {
        let x = row(&scaled(&self.scaler, features)?)?;

        let target = |m: &M, name: &str| -> Result<f64> {
            m.predict_rows(&x)
                .map_err(|e| ObserverError::Model(format!("{} prediction failed: {}", name, e)))?
                .first()
                .copied()
                .ok_or_else(|| ObserverError::Model(format!("{} prediction is empty", name)))
        };

        Ok(RawPrediction::Continuous {
            close: target(&self.close, "close")?,
            high: target(&self.high, "high")?,
            low: target(&self.low, "low")?,
        })
    }
}

/// Ordinary least squares over close/high/low
pub struct LinearRegressor {
    artifact: RegressorArtifact<LinReg>,
}

impl LinearRegressor {
    pub fn new(artifact: RegressorArtifact<LinReg>) -> Self {
        Self { artifact }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(read_artifact(path)?))
    }
}

impl Model for LinearRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn predict(&self, features: &[f64]) -> Result<RawPrediction> {
        self.artifact.predict(features)
    }
}

/// Elastic-net regularized regression over close/high/low
pub struct ElasticRegressor {
    artifact: RegressorArtifact<ElasticReg>,
}

impl ElasticRegressor {
    pub fn new(artifact: RegressorArtifact<ElasticReg>) -> Self {
        Self { artifact }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(read_artifact(path)?))
    }
}

impl Model for ElasticRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::ElasticNet
    }

    fn predict(&self, features: &[f64]) -> Result<RawPrediction> {
        self.artifact.predict(features)
    }
}

/// Logistic regression over the candle direction (-1, 0, 1)
#[derive(Debug, Serialize, Deserialize)]
pub struct DirectionClassifier {
    #[serde(default)]
    scaler: Option<Scaler>,
    direction: LogReg,
}

impl DirectionClassifier {
    pub fn new(direction: LogReg, scaler: Option<Scaler>) -> Self {
        Self { scaler, direction }
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_artifact(path)
    }
}

impl Model for DirectionClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Logistic
    }

    fn predict(&self, features: &[f64]) -> Result<RawPrediction> {
        let x = row(&scaled(&self.scaler, features)?)?;

        let label = self
            .direction
            .predict(&x)
            .map_err(|e| ObserverError::Model(format!("direction prediction failed: {}", e)))?
            .first()
            .copied()
            .ok_or_else(|| ObserverError::Model("direction prediction is empty".to_string()))?;

        Ok(RawPrediction::Direction(label.signum() as f64))
    }
}

fn row(features: &[f64]) -> Result<DenseMatrix<f64>> {
    DenseMatrix::from_2d_array(&[features])
        .map_err(|e| ObserverError::Model(format!("invalid feature row: {}", e)))
}
