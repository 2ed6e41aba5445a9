//! Classifier Contract
//!
//! Trait cho các classifier (random forest, gradient boosting).
//! `TrainedModel` is the serializable union stored inside an artifact.

use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::boosting::{BoostingConfig, GradientBoosting};
use super::forest::{ForestConfig, RandomForest};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    #[error("no training rows")]
    EmptyData,
    #[error("label count {labels} does not match row count {rows}")]
    LabelMismatch { rows: usize, labels: usize },
    #[error("fit cancelled")]
    Cancelled,
}

/// Return `Cancelled` once the flag is raised
pub(crate) fn check_cancel(cancel: &AtomicBool) -> Result<(), FitError> {
    if cancel.load(Ordering::Relaxed) {
        Err(FitError::Cancelled)
    } else {
        Ok(())
    }
}

pub(crate) fn check_shape(x: &Array2<f64>, y: &[f64]) -> Result<(), FitError> {
    if x.nrows() == 0 {
        return Err(FitError::EmptyData);
    }
    if x.nrows() != y.len() {
        return Err(FitError::LabelMismatch { rows: x.nrows(), labels: y.len() });
    }
    Ok(())
}

// ============================================================================
// CLASSIFIER TRAIT
// ============================================================================

/// Binary classifier over scaled feature rows
pub trait Classifier: Send + Sync {
    /// Probability of the positive (dropped out) class
    fn predict_proba(&self, row: &[f64]) -> f64;

    /// Hard label at 0.5
    fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) >= 0.5)
    }

    /// Normalized importance per input column (sums to 1 unless all zero)
    fn feature_importances(&self) -> &[f64];

    /// Expected row width
    fn n_features(&self) -> usize;

    fn algorithm(&self) -> Algorithm;
}

// ============================================================================
// ALGORITHMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    RandomForest,
    GradientBoosting,
}

impl Algorithm {
    /// Candidates in selection order (ties keep the earlier one)
    pub const CANDIDATES: [Algorithm; 2] = [Algorithm::RandomForest, Algorithm::GradientBoosting];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RandomForest => "random_forest",
            Algorithm::GradientBoosting => "gradient_boosting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "random_forest" => Some(Algorithm::RandomForest),
            "gradient_boosting" => Some(Algorithm::GradientBoosting),
            _ => None,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyper-parameters for both candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub boosting_max_depth: usize,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            boosting_max_depth: 3,
            seed: 42,
        }
    }
}

// ============================================================================
// TRAINED MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum TrainedModel {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl TrainedModel {
    /// Fit one candidate on (already scaled) rows
    pub fn fit(
        algorithm: Algorithm,
        x: &Array2<f64>,
        y: &[f64],
        config: &ModelConfig,
        cancel: &AtomicBool,
    ) -> Result<Self, FitError> {
        match algorithm {
            Algorithm::RandomForest => {
                let forest_config = ForestConfig {
                    n_estimators: config.n_estimators,
                    seed: config.seed,
                    ..ForestConfig::for_features(x.ncols())
                };
                RandomForest::fit(x, y, &forest_config, cancel).map(TrainedModel::RandomForest)
            }
            Algorithm::GradientBoosting => {
                let boosting_config = BoostingConfig {
                    n_estimators: config.n_estimators,
                    learning_rate: config.learning_rate,
                    max_depth: config.boosting_max_depth,
                    seed: config.seed,
                    ..BoostingConfig::default()
                };
                GradientBoosting::fit(x, y, &boosting_config, cancel).map(TrainedModel::GradientBoosting)
            }
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
        }
    }
}

impl Classifier for TrainedModel {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.inner().predict_proba(row)
    }

    fn feature_importances(&self) -> &[f64] {
        self.inner().feature_importances()
    }

    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn algorithm(&self) -> Algorithm {
        self.inner().algorithm()
    }
}

/// Scale raw importance totals so they sum to 1
pub(crate) fn normalize(mut values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
    values
}
