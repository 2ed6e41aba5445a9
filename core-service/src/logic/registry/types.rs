use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::features::layout::{layout_hash, FEATURE_VERSION};
use crate::logic::model::{Algorithm, Classifier, StandardScaler, TrainedModel};

// ============================================================================
// METRICS
// ============================================================================

/// Held-out evaluation of a trained candidate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean k-fold accuracy on the training split
    pub cv_score: f64,
}

// ============================================================================
// CANDIDATE (trainer output)
// ============================================================================

/// A freshly trained (model, scaler) pair, not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCandidate {
    pub algorithm: Algorithm,
    pub model: TrainedModel,
    pub scaler: StandardScaler,
    pub metrics: EvaluationMetrics,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub trained_at: DateTime<Utc>,
}

impl ArtifactCandidate {
    /// Candidate tagged with the current feature layout
    pub fn new(model: TrainedModel, scaler: StandardScaler, metrics: EvaluationMetrics) -> Self {
        Self {
            algorithm: model.algorithm(),
            model,
            scaler,
            metrics,
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            trained_at: Utc::now(),
        }
    }
}

// ============================================================================
// STORED ARTIFACT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: Uuid,
    pub version: String,
    pub algorithm: Algorithm,
    pub metrics: EvaluationMetrics,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub model_blob: Vec<u8>,
    pub scaler_blob: Vec<u8>,
    /// Hex SHA-256 over id, model blob and scaler blob
    pub checksum: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Listing row without the blobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub version: String,
    pub algorithm: Algorithm,
    pub metrics: EvaluationMetrics,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&ModelArtifact> for ArtifactSummary {
    fn from(a: &ModelArtifact) -> Self {
        Self {
            id: a.id,
            version: a.version.clone(),
            algorithm: a.algorithm,
            metrics: a.metrics,
            active: a.active,
            created_at: a.created_at,
        }
    }
}

// ============================================================================
// PROMOTION
// ============================================================================

/// Outcome of submitting a candidate. `Rejected` is a policy decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PromotionResult {
    Promoted {
        artifact_id: Uuid,
        version: String,
        replaced: Option<Uuid>,
    },
    Rejected {
        artifact_id: Uuid,
        version: String,
        accuracy: f64,
        threshold: f64,
    },
}

impl PromotionResult {
    pub fn artifact_id(&self) -> Uuid {
        match self {
            PromotionResult::Promoted { artifact_id, .. } | PromotionResult::Rejected { artifact_id, .. } => *artifact_id,
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionResult::Promoted { .. })
    }
}

// ============================================================================
// ACTIVE MODEL
// ============================================================================

/// Decoded, verified pair served to the predictor. Always swapped as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveModel {
    pub artifact_id: Uuid,
    pub version: String,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub model: TrainedModel,
    pub scaler: StandardScaler,
}
