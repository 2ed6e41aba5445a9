//! Registry Module - Versioned Model Artifacts
//!
//! Stores every trained (model, scaler) pair and promotes at most one of them
//! to active.
//!
//! # Architecture
//! - `types.rs`: `ModelArtifact`, `ArtifactCandidate`, `PromotionResult`, `ActiveModel`
//! - `validate.rs`: checksum and layout checks, `RegistryError`
//! - `storage.rs`: SQLite persistence
//! - `bundle.rs`: single-file export/import
//!
//! # Promotion
//! Promotion runs under one mutex: the database switch is a single
//! transaction, then the in-memory pair is replaced as one `Arc`. Readers
//! always see a complete old pair or a complete new pair.

pub mod types;
pub mod validate;
pub mod storage;
pub mod bundle;
#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::logic::model::ActiveModelSource;
use storage::ArtifactStore;
use validate::{decode_artifact, verify_checksum};

pub use types::{
    ActiveModel, ArtifactCandidate, ArtifactSummary, EvaluationMetrics, ModelArtifact, PromotionResult,
};
pub use validate::RegistryError;

pub use crate::constants::DEFAULT_PROMOTION_THRESHOLD;

pub struct ModelRegistry {
    store: ArtifactStore,
    promotion_threshold: f64,
    promotion_lock: Mutex<()>,
    active: RwLock<Option<Arc<ActiveModel>>>,
}

impl ModelRegistry {
    pub fn open(path: &Path, promotion_threshold: f64) -> Result<Self, RegistryError> {
        Self::with_store(ArtifactStore::open(path)?, promotion_threshold)
    }

    pub fn in_memory(promotion_threshold: f64) -> Result<Self, RegistryError> {
        Self::with_store(ArtifactStore::in_memory()?, promotion_threshold)
    }

    fn with_store(store: ArtifactStore, promotion_threshold: f64) -> Result<Self, RegistryError> {
        let registry = Self {
            store,
            promotion_threshold,
            promotion_lock: Mutex::new(()),
            active: RwLock::new(None),
        };
        match registry.refresh_active() {
            Ok(_) => {}
            Err(e @ (RegistryError::ArtifactCorrupted { .. } | RegistryError::LayoutMismatch { .. })) => {
                log::warn!("Starting without an active model: {}", e);
            }
            Err(e) => return Err(e),
        }
        Ok(registry)
    }

    pub fn promotion_threshold(&self) -> f64 {
        self.promotion_threshold
    }

    /// Store a candidate and promote it if it clears the threshold
    pub fn submit(&self, candidate: ArtifactCandidate) -> Result<PromotionResult, RegistryError> {
        let _guard = self.promotion_lock.lock();

        let artifact = self.store.insert_candidate(&candidate)?;
        let accuracy = artifact.metrics.accuracy;

        if accuracy < self.promotion_threshold {
            log::info!(
                "Artifact {} ({}) not promoted: accuracy {:.4} < {:.2}",
                artifact.id, artifact.version, accuracy, self.promotion_threshold
            );
            return Ok(PromotionResult::Rejected {
                artifact_id: artifact.id,
                version: artifact.version,
                accuracy,
                threshold: self.promotion_threshold,
            });
        }

        self.promote_locked(&artifact)
    }

    /// Re-activate a stored artifact (rollback). Still subject to the threshold.
    pub fn activate(&self, id: Uuid) -> Result<PromotionResult, RegistryError> {
        let _guard = self.promotion_lock.lock();

        let artifact = self.store.get(id)?.ok_or(RegistryError::NotFound(id))?;
        if artifact.metrics.accuracy < self.promotion_threshold {
            return Ok(PromotionResult::Rejected {
                artifact_id: artifact.id,
                version: artifact.version,
                accuracy: artifact.metrics.accuracy,
                threshold: self.promotion_threshold,
            });
        }

        self.promote_locked(&artifact)
    }

    /// Caller holds `promotion_lock`
    fn promote_locked(&self, artifact: &ModelArtifact) -> Result<PromotionResult, RegistryError> {
        let decoded = Arc::new(decode_artifact(artifact)?);
        let replaced = self.store.activate(artifact.id)?;
        *self.active.write() = Some(decoded);

        log::info!(
            "Promoted artifact {} ({}, {}) accuracy {:.4}, replaced {:?}",
            artifact.id, artifact.version, artifact.algorithm, artifact.metrics.accuracy, replaced
        );
        Ok(PromotionResult::Promoted {
            artifact_id: artifact.id,
            version: artifact.version.clone(),
            replaced,
        })
    }

    /// Active artifact as stored, blobs included
    /// The stored active artifact. Fails with `ArtifactCorrupted` when the
    /// blobs no longer match the recorded checksum.
    pub fn get_active(&self) -> Result<Option<ModelArtifact>, RegistryError> {
        match self.store.active()? {
            Some(artifact) => {
                verify_checksum(&artifact)?;
                Ok(Some(artifact))
            }
            None => Ok(None),
        }
    }

    /// The decoded active pair, if any
    pub fn active_model(&self) -> Option<Arc<ActiveModel>> {
        self.active.read().clone()
    }

    pub fn list(&self) -> Result<Vec<ArtifactSummary>, RegistryError> {
        self.store.list()
    }

    pub fn load(&self, id: Uuid) -> Result<ModelArtifact, RegistryError> {
        let artifact = self.store.get(id)?.ok_or(RegistryError::NotFound(id))?;
        verify_checksum(&artifact)?;
        Ok(artifact)
    }

    /// Pick up a promotion made by another process. Returns true when the
    /// in-memory pair changed.
    pub fn refresh_active(&self) -> Result<bool, RegistryError> {
        let _guard = self.promotion_lock.lock();

        let stored = self.store.active()?;
        let current = self.active.read().as_ref().map(|a| a.artifact_id);

        match stored {
            Some(artifact) if Some(artifact.id) != current => match decode_artifact(&artifact) {
                Ok(decoded) => {
                    log::info!("Loaded active artifact {} ({})", artifact.id, artifact.version);
                    *self.active.write() = Some(Arc::new(decoded));
                    Ok(true)
                }
                Err(e) => {
                    log::error!("Active artifact {} unusable: {}. Serving without a model.", artifact.id, e);
                    *self.active.write() = None;
                    Err(e)
                }
            },
            Some(_) => Ok(false),
            None => {
                let changed = current.is_some();
                *self.active.write() = None;
                Ok(changed)
            }
        }
    }

    pub fn export_bundle(&self, id: Uuid, path: &Path) -> Result<(), RegistryError> {
        bundle::save_bundle(&self.load(id)?, path)
    }

    /// Import a bundle as a new candidate (new id and version, same policy)
    pub fn import_bundle(&self, path: &Path) -> Result<PromotionResult, RegistryError> {
        let artifact = bundle::load_bundle(path)?;
        let decoded = decode_artifact(&artifact)?;
        self.submit(ArtifactCandidate {
            algorithm: artifact.algorithm,
            model: decoded.model,
            scaler: decoded.scaler,
            metrics: artifact.metrics,
            feature_version: artifact.feature_version,
            layout_hash: artifact.layout_hash,
            trained_at: artifact.created_at,
        })
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

impl ActiveModelSource for ModelRegistry {
    fn active_model(&self) -> Option<Arc<ActiveModel>> {
        ModelRegistry::active_model(self)
    }
}
