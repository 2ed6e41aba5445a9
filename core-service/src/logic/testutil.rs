//! Shared fixtures for unit tests

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ndarray::Array2;
use parking_lot::RwLock;
use rand::{rngs::StdRng, Rng, SeedableRng};
use uuid::Uuid;

use crate::logic::dataset::{DropoutLabel, TrainingExample};
use crate::logic::features::layout::{layout_hash, FEATURE_VERSION};
use crate::logic::features::{StudentFeatures, StudentSnapshot, FEATURE_COUNT};
use crate::logic::model::{ActiveModelSource, Algorithm, ModelConfig, StandardScaler, TrainedModel};
use crate::logic::registry::ActiveModel;

/// Student clearly at risk of dropping out
pub fn at_risk_features<R: Rng>(rng: &mut R) -> StudentFeatures {
    StudentFeatures {
        attendance_percentage: rng.gen_range(40.0..65.0),
        gpa: rng.gen_range(0.5..1.8),
        consecutive_absences: rng.gen_range(5..=15) as f64,
        failing_subjects: rng.gen_range(3..=6) as f64,
        late_submissions: rng.gen_range(5..=15) as f64,
        fee_overdue_days: rng.gen_range(60..=200) as f64,
        age: rng.gen_range(17..=22) as f64,
        parent_education_level: rng.gen_range(0..=5) as f64,
        family_income_bracket: rng.gen_range(0..=5) as f64,
    }
}

/// Student clearly on track
pub fn retained_features<R: Rng>(rng: &mut R) -> StudentFeatures {
    StudentFeatures {
        attendance_percentage: rng.gen_range(85.0..=100.0),
        gpa: rng.gen_range(3.0..=4.0),
        consecutive_absences: rng.gen_range(0..=2) as f64,
        failing_subjects: 0.0,
        late_submissions: rng.gen_range(0..=2) as f64,
        fee_overdue_days: rng.gen_range(0..=10) as f64,
        age: rng.gen_range(17..=22) as f64,
        parent_education_level: rng.gen_range(0..=5) as f64,
        family_income_bracket: rng.gen_range(0..=5) as f64,
    }
}

/// `n_per_class` examples of each label, interleaved
pub fn synthetic_examples(n_per_class: usize, seed: u64) -> Vec<TrainingExample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut examples = Vec::with_capacity(n_per_class * 2);
    for i in 0..n_per_class {
        examples.push(TrainingExample::new(
            StudentSnapshot::new(format!("R-{}", i), retained_features(&mut rng)),
            DropoutLabel::Retained,
        ));
        examples.push(TrainingExample::new(
            StudentSnapshot::new(format!("D-{}", i), at_risk_features(&mut rng)),
            DropoutLabel::DroppedOut,
        ));
    }
    examples
}

/// Same data as `synthetic_examples`, as a matrix and 0/1 targets
pub fn separable_matrix(n_per_class: usize, seed: u64) -> (Array2<f64>, Vec<f64>) {
    let examples = synthetic_examples(n_per_class, seed);
    let mut x = Array2::zeros((examples.len(), FEATURE_COUNT));
    let mut y = Vec::with_capacity(examples.len());
    for (i, example) in examples.iter().enumerate() {
        for (j, v) in example.features().to_array().iter().enumerate() {
            x[[i, j]] = *v;
        }
        y.push(example.label.as_target());
    }
    (x, y)
}

/// Small random forest fitted on synthetic data, wrapped as an active pair
pub fn fitted_active_model() -> Arc<ActiveModel> {
    let (x, y) = separable_matrix(30, 9);
    let scaler = StandardScaler::fit(&x);
    let config = ModelConfig { n_estimators: 10, ..Default::default() };
    let model = TrainedModel::fit(Algorithm::RandomForest, &scaler.transform(&x), &y, &config, &AtomicBool::new(false))
        .unwrap();
    Arc::new(ActiveModel {
        artifact_id: Uuid::new_v4(),
        version: "1.0.0".to_string(),
        feature_version: FEATURE_VERSION,
        layout_hash: layout_hash(),
        model,
        scaler,
    })
}

/// Model source with a swappable pair
pub struct StaticSource(RwLock<Option<Arc<ActiveModel>>>);

impl StaticSource {
    pub fn new(model: Option<Arc<ActiveModel>>) -> Self {
        Self(RwLock::new(model))
    }

    pub fn set(&self, model: Option<Arc<ActiveModel>>) {
        *self.0.write() = model;
    }
}

impl ActiveModelSource for StaticSource {
    fn active_model(&self) -> Option<Arc<ActiveModel>> {
        self.0.read().clone()
    }
}
