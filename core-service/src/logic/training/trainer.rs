use std::sync::atomic::AtomicBool;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::logic::dataset::TrainingExample;
use crate::logic::features::FEATURE_COUNT;
use crate::logic::model::{Algorithm, Classifier, FitError, ModelConfig, StandardScaler, TrainedModel};
use crate::logic::registry::{ArtifactCandidate, EvaluationMetrics};
use super::cross_validation::{cross_val_score, CandidateScore};
use super::metrics::ConfusionMatrix;
use super::split::stratified_split;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub min_examples: usize,
    pub test_fraction: f64,
    pub cv_folds: usize,
    /// Seed for the train/test split and fold assignment
    pub seed: u64,
    pub model: ModelConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_examples: 20,
            test_fraction: 0.2,
            cv_folds: 5,
            seed: 42,
            model: ModelConfig::default(),
        }
    }
}

/// Each class needs this many rows so both splits see it
const MIN_PER_CLASS: usize = 2;

// ============================================================================
// ERRORS & OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainingError {
    #[error("insufficient training data: {examples} examples across {classes} classes (need at least {minimum} and both classes)")]
    InsufficientData { examples: usize, classes: usize, minimum: usize },

    #[error("training cancelled")]
    Cancelled,

    #[error("model error: {0}")]
    Model(String),
}

impl From<FitError> for TrainingError {
    fn from(err: FitError) -> Self {
        match err {
            FitError::Cancelled => TrainingError::Cancelled,
            other => TrainingError::Model(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub candidate: ArtifactCandidate,
    pub metrics: EvaluationMetrics,
    /// Cross-validation results in candidate order
    pub cv_scores: Vec<CandidateScore>,
}

// ============================================================================
// TRAINER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn train(&self, examples: &[TrainingExample]) -> Result<TrainingOutcome, TrainingError> {
        self.train_with_cancel(examples, &AtomicBool::new(false))
    }

    /// Train, checking `cancel` between trees
    pub fn train_with_cancel(
        &self,
        examples: &[TrainingExample],
        cancel: &AtomicBool,
    ) -> Result<TrainingOutcome, TrainingError> {
        self.check_data(examples)?;

        let (x, y) = to_matrix(examples);
        let classes: Vec<usize> = examples.iter().map(|e| e.label.class_index()).collect();

        let split = stratified_split(&classes, self.config.test_fraction, self.config.seed);
        let x_train = x.select(Axis(0), &split.train);
        let x_test = x.select(Axis(0), &split.test);
        let y_train: Vec<f64> = split.train.iter().map(|&i| y[i]).collect();
        let y_test: Vec<u8> = split.test.iter().map(|&i| classes[i] as u8).collect();

        let scaler = StandardScaler::fit(&x_train);
        let x_train = scaler.transform(&x_train);
        let x_test = scaler.transform(&x_test);

        let mut cv_scores = Vec::with_capacity(Algorithm::CANDIDATES.len());
        for algorithm in Algorithm::CANDIDATES {
            let score = cross_val_score(algorithm, &x_train, &y_train, self.config.cv_folds, &self.config.model, cancel)?;
            log::info!("CV {}: mean accuracy {:.4} over {} folds", algorithm, score.mean, score.fold_scores.len());
            cv_scores.push(score);
        }

        let best = select_best(&cv_scores);
        let model = TrainedModel::fit(best.algorithm, &x_train, &y_train, &self.config.model, cancel)?;

        let predicted: Vec<u8> = x_test.rows().into_iter().map(|row| model.predict(&row.to_vec())).collect();
        let confusion = ConfusionMatrix::from_labels(&y_test, &predicted);
        let metrics = EvaluationMetrics {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            cv_score: best.mean,
        };

        log::info!(
            "Selected {} (cv {:.4}): accuracy {:.4}, precision {:.4}, recall {:.4}, f1 {:.4} on {} held-out rows",
            best.algorithm, best.mean, metrics.accuracy, metrics.precision, metrics.recall, metrics.f1, y_test.len()
        );

        Ok(TrainingOutcome {
            candidate: ArtifactCandidate::new(model, scaler, metrics),
            metrics,
            cv_scores,
        })
    }

    fn check_data(&self, examples: &[TrainingExample]) -> Result<(), TrainingError> {
        let mut per_class = [0usize; 2];
        for e in examples {
            per_class[e.label.class_index()] += 1;
        }
        let classes = per_class.iter().filter(|&&c| c > 0).count();

        if examples.len() < self.config.min_examples || classes < 2 || per_class.iter().any(|&c| c < MIN_PER_CLASS) {
            return Err(TrainingError::InsufficientData {
                examples: examples.len(),
                classes,
                minimum: self.config.min_examples,
            });
        }
        Ok(())
    }
}

/// Highest mean wins; ties keep the earlier candidate
fn select_best(scores: &[CandidateScore]) -> &CandidateScore {
    let mut best = &scores[0];
    for score in &scores[1..] {
        if score.mean > best.mean {
            best = score;
        }
    }
    best
}

fn to_matrix(examples: &[TrainingExample]) -> (Array2<f64>, Vec<f64>) {
    let mut x = Array2::zeros((examples.len(), FEATURE_COUNT));
    for (i, example) in examples.iter().enumerate() {
        for (j, v) in example.features().to_array().into_iter().enumerate() {
            x[[i, j]] = v;
        }
    }
    let y = examples.iter().map(|e| e.label.as_target()).collect();
    (x, y)
}
