use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::logic::features::layout::validate_layout;
use crate::logic::model::{Classifier, StandardScaler, TrainedModel};
use super::types::{ActiveModel, ModelArtifact};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("artifact {id} corrupted: {reason}")]
    ArtifactCorrupted { id: Uuid, reason: String },

    #[error("artifact layout mismatch: expected v{expected_version} ({expected_hash:x}), got v{actual_version} ({actual_hash:x})")]
    LayoutMismatch {
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },

    #[error("artifact {0} not found")]
    NotFound(Uuid),
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

// ============================================================================
// CHECKS
// ============================================================================

pub fn compute_checksum(id: &Uuid, model_blob: &[u8], scaler_blob: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(model_blob);
    hasher.update(scaler_blob);
    hex::encode(hasher.finalize())
}

/// Validate artifact compatibility with the current feature layout
pub fn validate_artifact_layout(artifact: &ModelArtifact) -> Result<(), RegistryError> {
    validate_layout(artifact.feature_version, artifact.layout_hash).map_err(|e| RegistryError::LayoutMismatch {
        expected_version: e.expected_version,
        expected_hash: e.expected_hash,
        actual_version: e.actual_version,
        actual_hash: e.actual_hash,
    })
}

pub fn verify_checksum(artifact: &ModelArtifact) -> Result<(), RegistryError> {
    let expected = compute_checksum(&artifact.id, &artifact.model_blob, &artifact.scaler_blob);
    if expected != artifact.checksum {
        return Err(RegistryError::ArtifactCorrupted {
            id: artifact.id,
            reason: "checksum mismatch".to_string(),
        });
    }
    Ok(())
}

/// Checksum, layout and blob decoding. Never yields a half-valid pair.
pub fn decode_artifact(artifact: &ModelArtifact) -> Result<ActiveModel, RegistryError> {
    verify_checksum(artifact)?;
    validate_artifact_layout(artifact)?;

    let corrupted = |what: &str, e: serde_json::Error| RegistryError::ArtifactCorrupted {
        id: artifact.id,
        reason: format!("{} blob: {}", what, e),
    };
    let model = TrainedModel::from_bytes(&artifact.model_blob).map_err(|e| corrupted("model", e))?;
    let scaler = StandardScaler::from_bytes(&artifact.scaler_blob).map_err(|e| corrupted("scaler", e))?;

    if model.n_features() != scaler.n_features() {
        return Err(RegistryError::ArtifactCorrupted {
            id: artifact.id,
            reason: format!("model expects {} features, scaler has {}", model.n_features(), scaler.n_features()),
        });
    }

    Ok(ActiveModel {
        artifact_id: artifact.id,
        version: artifact.version.clone(),
        feature_version: artifact.feature_version,
        layout_hash: artifact.layout_hash,
        model,
        scaler,
    })
}
