use std::fs;
use std::path::Path;

use super::types::ModelArtifact;
use super::validate::{decode_artifact, RegistryError};

/// Export an artifact (metadata and both blobs) as one JSON file
pub fn save_bundle(artifact: &ModelArtifact, path: &Path) -> Result<(), RegistryError> {
    // Ensure directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(artifact)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a bundle, verifying checksum, layout and both blobs
pub fn load_bundle(path: &Path) -> Result<ModelArtifact, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::Storage(format!("bundle not found: {}", path.display())));
    }

    let data = fs::read(path)?;
    let artifact: ModelArtifact = serde_json::from_slice(&data)?;

    decode_artifact(&artifact)?;

    Ok(artifact)
}
