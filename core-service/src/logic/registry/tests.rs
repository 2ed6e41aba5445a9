use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::bundle::{load_bundle, save_bundle};
use super::types::{ArtifactCandidate, EvaluationMetrics, PromotionResult};
use super::validate::{compute_checksum, decode_artifact, RegistryError};
use super::ModelRegistry;
use crate::logic::dataset::DropoutLabel;
use crate::logic::model::{Algorithm, Classifier, ModelConfig, StandardScaler, TrainedModel};
use crate::logic::testutil::{separable_matrix, synthetic_examples};
use crate::logic::training::{Trainer, TrainingError};

fn candidate(accuracy: f64, seed: u64) -> ArtifactCandidate {
    let (x, y) = separable_matrix(15, seed);
    let scaler = StandardScaler::fit(&x);
    let config = ModelConfig { n_estimators: 5, seed, ..Default::default() };
    let model = TrainedModel::fit(Algorithm::GradientBoosting, &scaler.transform(&x), &y, &config, &AtomicBool::new(false)).unwrap();
    let metrics = EvaluationMetrics { accuracy, precision: accuracy, recall: accuracy, f1: accuracy, cv_score: accuracy };
    ArtifactCandidate::new(model, scaler, metrics)
}

fn promoted_id(result: &PromotionResult) -> uuid::Uuid {
    match result {
        PromotionResult::Promoted { artifact_id, .. } => *artifact_id,
        other => panic!("expected promotion, got {:?}", other),
    }
}

#[test]
fn test_submit_promotes_above_threshold() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    assert!(registry.active_model().is_none());
    assert!(registry.get_active().unwrap().is_none());

    let result = registry.submit(candidate(0.9, 1)).unwrap();
    let id = promoted_id(&result);

    assert_eq!(registry.active_model().unwrap().artifact_id, id);
    let stored = registry.get_active().unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.version, "1.0.0");
    assert!(stored.active);
}

#[test]
fn test_threshold_is_inclusive() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    assert!(registry.submit(candidate(0.75, 1)).unwrap().is_promoted());
}

#[test]
fn test_low_accuracy_rejected_and_active_unchanged() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    let first = promoted_id(&registry.submit(candidate(0.9, 1)).unwrap());
    let before = registry.get_active().unwrap().unwrap();

    let result = registry.submit(candidate(0.60, 2)).unwrap();
    match &result {
        PromotionResult::Rejected { accuracy, threshold, version, .. } => {
            assert_eq!(*accuracy, 0.60);
            assert_eq!(*threshold, 0.75);
            assert_eq!(version, "1.1.0");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    assert_eq!(registry.get_active().unwrap().unwrap(), before);
    assert_eq!(registry.active_model().unwrap().artifact_id, first);

    // Rejected artifact is kept for audit
    let listed = registry.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].active);
    assert!(!listed[1].active);
    assert_eq!(listed[1].id, result.artifact_id());
}

#[test]
fn test_failed_training_leaves_registry_untouched() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    let first = promoted_id(&registry.submit(candidate(0.9, 1)).unwrap());

    let one_class: Vec<_> = synthetic_examples(30, 5)
        .into_iter()
        .filter(|e| e.label == DropoutLabel::DroppedOut)
        .collect();
    let result = Trainer::default().train(&one_class);
    assert!(matches!(result, Err(TrainingError::InsufficientData { .. })));

    assert_eq!(registry.get_active().unwrap().unwrap().id, first);
    assert_eq!(registry.list().unwrap().len(), 1);
}

#[test]
fn test_exactly_one_active_after_each_promotion() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    let mut previous = None;

    for (i, seed) in (10..15).enumerate() {
        let result = registry.submit(candidate(0.8 + i as f64 * 0.01, seed)).unwrap();
        match result {
            PromotionResult::Promoted { artifact_id, version, replaced } => {
                assert_eq!(replaced, previous);
                assert_eq!(version, format!("1.{}.0", i));
                previous = Some(artifact_id);
            }
            other => panic!("expected promotion, got {:?}", other),
        }
        assert_eq!(registry.store().count_active().unwrap(), 1);
    }
}

#[test]
fn test_rollback_with_activate() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    let a = promoted_id(&registry.submit(candidate(0.9, 1)).unwrap());
    let b = promoted_id(&registry.submit(candidate(0.85, 2)).unwrap());
    assert_eq!(registry.active_model().unwrap().artifact_id, b);

    let result = registry.activate(a).unwrap();
    assert_eq!(result, PromotionResult::Promoted { artifact_id: a, version: "1.0.0".to_string(), replaced: Some(b) });
    assert_eq!(registry.active_model().unwrap().artifact_id, a);
    assert_eq!(registry.store().count_active().unwrap(), 1);
}

#[test]
fn test_activate_unknown_or_rejected() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    assert!(matches!(registry.activate(uuid::Uuid::new_v4()), Err(RegistryError::NotFound(_))));

    let weak = registry.submit(candidate(0.5, 1)).unwrap().artifact_id();
    assert!(!registry.activate(weak).unwrap().is_promoted());
    assert!(registry.active_model().is_none());
}

#[test]
fn test_foreign_layout_is_never_activated() {
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    let good = promoted_id(&registry.submit(candidate(0.9, 1)).unwrap());

    let mut foreign = candidate(0.95, 2);
    foreign.layout_hash = !foreign.layout_hash;
    assert!(matches!(registry.submit(foreign), Err(RegistryError::LayoutMismatch { .. })));

    assert_eq!(registry.active_model().unwrap().artifact_id, good);
    assert_eq!(registry.get_active().unwrap().unwrap().id, good);
}

#[test]
fn test_sqlite_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");
    let original = candidate(0.9, 3);
    let (x, _) = separable_matrix(5, 99);

    let id = {
        let registry = ModelRegistry::open(&path, 0.75).unwrap();
        promoted_id(&registry.submit(original.clone()).unwrap())
    };

    let reopened = ModelRegistry::open(&path, 0.75).unwrap();
    let active = reopened.active_model().unwrap();
    assert_eq!(active.artifact_id, id);
    assert_eq!(active.model, original.model);
    assert_eq!(active.scaler, original.scaler);

    for row in x.rows() {
        let row = active.scaler.transform_row(&row.to_vec());
        assert_eq!(active.model.predict_proba(&row).to_bits(), original.model.predict_proba(&row).to_bits());
    }

    let loaded = reopened.load(id).unwrap();
    assert_eq!(loaded.metrics, original.metrics);
    assert_eq!(loaded.checksum, compute_checksum(&id, &loaded.model_blob, &loaded.scaler_blob));
}

#[test]
fn test_corrupted_blob_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");

    let id = {
        let registry = ModelRegistry::open(&path, 0.75).unwrap();
        let id = promoted_id(&registry.submit(candidate(0.9, 3)).unwrap());
        registry.store().corrupt_model_blob(id).unwrap();
        let raw = registry.store().get(id).unwrap().unwrap();
        assert!(matches!(decode_artifact(&raw), Err(RegistryError::ArtifactCorrupted { .. })));
        assert!(matches!(registry.load(id), Err(RegistryError::ArtifactCorrupted { id: bad, .. }) if bad == id));
        id
    };

    // Opens, but serves nothing rather than a mismatched pair
    let reopened = ModelRegistry::open(&path, 0.75).unwrap();
    assert!(reopened.active_model().is_none());
    assert!(matches!(reopened.get_active(), Err(RegistryError::ArtifactCorrupted { id: bad, .. }) if bad == id));
    assert!(matches!(reopened.load(id), Err(RegistryError::ArtifactCorrupted { .. })));

    let export = dir.path().join("corrupt.bundle.json");
    assert!(matches!(reopened.export_bundle(id, &export), Err(RegistryError::ArtifactCorrupted { .. })));
    assert!(!export.exists());
}

#[test]
fn test_refresh_picks_up_other_process_promotion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");

    let writer = ModelRegistry::open(&path, 0.75).unwrap();
    let reader = ModelRegistry::open(&path, 0.75).unwrap();
    assert!(reader.active_model().is_none());

    let id = promoted_id(&writer.submit(candidate(0.9, 4)).unwrap());
    assert!(reader.refresh_active().unwrap());
    assert_eq!(reader.active_model().unwrap().artifact_id, id);
    assert!(!reader.refresh_active().unwrap());
}

#[test]
fn test_bundle_round_trip_and_tamper() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::in_memory(0.75).unwrap();
    let id = promoted_id(&registry.submit(candidate(0.9, 6)).unwrap());

    let path = dir.path().join("bundles").join("model.json");
    registry.export_bundle(id, &path).unwrap();
    let loaded = load_bundle(&path).unwrap();
    assert_eq!(loaded, registry.load(id).unwrap());

    let mut tampered = loaded.clone();
    tampered.scaler_blob.push(b' ');
    let tampered_path = dir.path().join("tampered.json");
    save_bundle(&tampered, &tampered_path).unwrap();
    assert!(matches!(load_bundle(&tampered_path), Err(RegistryError::ArtifactCorrupted { .. })));

    let other = ModelRegistry::in_memory(0.75).unwrap();
    let imported = promoted_id(&other.import_bundle(&path).unwrap());
    assert_ne!(imported, id);
    assert_eq!(other.active_model().unwrap().model, registry.active_model().unwrap().model);
}

#[test]
fn test_no_mixed_pair_under_concurrent_promotion() {
    let registry = Arc::new(ModelRegistry::in_memory(0.75).unwrap());
    let a = candidate(0.9, 21);
    let b = candidate(0.9, 22);
    assert_ne!(a.scaler, b.scaler);

    let id_a = promoted_id(&registry.submit(a.clone()).unwrap());
    let id_b = promoted_id(&registry.submit(b.clone()).unwrap());

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                let mut reads = 0;
                while !done.load(Ordering::Relaxed) || reads == 0 {
                    let active = registry.active_model().unwrap();
                    let expected = if active.artifact_id == id_a { &a } else { &b };
                    assert_eq!(active.scaler, expected.scaler);
                    assert_eq!(active.model, expected.model);
                    reads += 1;
                }
            })
        })
        .collect();

    for i in 0..50 {
        let target = if i % 2 == 0 { id_a } else { id_b };
        registry.activate(target).unwrap();
        assert_eq!(registry.store().count_active().unwrap(), 1);
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
}
