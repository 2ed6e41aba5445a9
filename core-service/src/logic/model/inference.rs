//! Inference Engine - Risk Predictor
//!
//! Chạy model đang active trên snapshot của một học sinh.
//! Reads the registry's active (model, scaler) pair once per call, so a
//! concurrent promotion never mixes an old scaler with a new model.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::explain::{self, ExplainResult};
use crate::logic::features::layout::{layout_hash, FEATURE_VERSION};
use crate::logic::features::{FeatureVector, StudentSnapshot};
use crate::logic::registry::ActiveModel;
use super::classifier::Classifier;
use super::tier::RiskTier;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictError {
    #[error("no active model")]
    ModelUnavailable,

    #[error("feature shape mismatch: model expects {expected} values, got {actual}")]
    FeatureShapeMismatch { expected: usize, actual: usize },

    #[error("feature layout mismatch: model v{expected_version} ({expected_hash:x}), input v{actual_version} ({actual_hash:x})")]
    LayoutMismatch {
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// One scored inference. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub student_id: String,
    pub artifact_id: Uuid,
    pub model_version: String,
    /// Dropout probability in [0, 1]
    pub probability: f64,
    pub tier: RiskTier,
    /// Distance from the decision boundary, `|2p - 1|`
    pub confidence: f64,
    pub explanation: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// The `n` strongest risk factors, descending
    pub fn top_factors(&self, n: usize) -> Vec<(String, f64)> {
        explain::top_factors(&self.explanation, n)
    }

    pub fn explain(&self, snapshot: Option<&StudentSnapshot>) -> Option<ExplainResult> {
        explain::explain(&self.explanation, snapshot.map(|s| &s.features))
    }
}

/// Prediction with the no-model fallback applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskAssessment {
    Scored(Prediction),
    Unavailable { student_id: String },
}

impl RiskAssessment {
    pub fn tier(&self) -> RiskTier {
        match self {
            RiskAssessment::Scored(p) => p.tier,
            RiskAssessment::Unavailable { .. } => RiskTier::Low,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            RiskAssessment::Scored(p) => p.confidence,
            RiskAssessment::Unavailable { .. } => 0.0,
        }
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            RiskAssessment::Scored(p) => Some(p),
            RiskAssessment::Unavailable { .. } => None,
        }
    }
}

/// Predictor status for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorStatus {
    pub model_loaded: bool,
    pub model_version: Option<String>,
    pub avg_latency_us: f64,
    pub inference_count: u64,
}

// ============================================================================
// MODEL SOURCE
// ============================================================================

/// Anything that can hand out the current active pair
pub trait ActiveModelSource: Send + Sync {
    fn active_model(&self) -> Option<Arc<ActiveModel>>;
}

// ============================================================================
// PREDICTOR
// ============================================================================

pub struct Predictor {
    source: Arc<dyn ActiveModelSource>,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

impl Predictor {
    pub fn new(source: Arc<dyn ActiveModelSource>) -> Self {
        Self {
            source,
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    pub fn predict(&self, snapshot: &StudentSnapshot) -> Result<Prediction, PredictError> {
        let values = snapshot.features.to_array();
        self.score(&snapshot.student_id, FEATURE_VERSION, layout_hash(), &values)
    }

    /// Score a wire-form vector, checking its layout tag and length
    pub fn predict_vector(&self, student_id: &str, vector: &FeatureVector) -> Result<Prediction, PredictError> {
        self.score(student_id, vector.version, vector.layout_hash, vector.as_slice())
    }

    /// Like `predict`, but a missing model yields `RiskAssessment::Unavailable`
    pub fn assess(&self, snapshot: &StudentSnapshot) -> Result<RiskAssessment, PredictError> {
        match self.predict(snapshot) {
            Ok(prediction) => Ok(RiskAssessment::Scored(prediction)),
            Err(PredictError::ModelUnavailable) => {
                log::warn!("No active model, {} defaults to low risk", snapshot.student_id);
                Ok(RiskAssessment::Unavailable { student_id: snapshot.student_id.clone() })
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.source.active_model().is_some()
    }

    pub fn status(&self) -> PredictorStatus {
        let active = self.source.active_model();
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        PredictorStatus {
            model_loaded: active.is_some(),
            model_version: active.map(|a| a.version.clone()),
            avg_latency_us: if count > 0 { sum as f64 / count as f64 } else { 0.0 },
            inference_count: count,
        }
    }

    fn score(&self, student_id: &str, version: u8, hash: u32, values: &[f64]) -> Result<Prediction, PredictError> {
        let started = Instant::now();
        let active = self.source.active_model().ok_or(PredictError::ModelUnavailable)?;

        if version != active.feature_version || hash != active.layout_hash {
            return Err(PredictError::LayoutMismatch {
                expected_version: active.feature_version,
                expected_hash: active.layout_hash,
                actual_version: version,
                actual_hash: hash,
            });
        }

        let expected = active.model.n_features();
        if values.len() != expected || active.scaler.n_features() != expected {
            return Err(PredictError::FeatureShapeMismatch { expected, actual: values.len() });
        }

        let scaled = active.scaler.transform_row(values);
        let raw = active.model.predict_proba(&scaled);
        let probability = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };

        let prediction = Prediction {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            artifact_id: active.artifact_id,
            model_version: active.version.clone(),
            probability,
            tier: RiskTier::from_probability(probability),
            confidence: (2.0 * probability - 1.0).abs(),
            explanation: explain::importance_map(active.model.feature_importances()),
            created_at: Utc::now(),
        };

        self.latency_sum_us.fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        Ok(prediction)
    }
}
