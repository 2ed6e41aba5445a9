//! K-fold cross-validation of a candidate algorithm on the training split

use std::sync::atomic::AtomicBool;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::logic::model::{Algorithm, Classifier, FitError, ModelConfig, TrainedModel};
use super::metrics::ConfusionMatrix;
use super::split::stratified_kfold;

/// Cross-validation result for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub algorithm: Algorithm,
    /// Held-out accuracy per fold
    pub fold_scores: Vec<f64>,
    pub mean: f64,
}

impl CandidateScore {
    pub fn from_scores(algorithm: Algorithm, fold_scores: Vec<f64>) -> Self {
        let mean = if fold_scores.is_empty() {
            0.0
        } else {
            fold_scores.iter().sum::<f64>() / fold_scores.len() as f64
        };
        Self { algorithm, fold_scores, mean }
    }
}

/// Accuracy of `algorithm` on each of `k` stratified folds of (x, y)
pub fn cross_val_score(
    algorithm: Algorithm,
    x: &Array2<f64>,
    y: &[f64],
    k: usize,
    config: &ModelConfig,
    cancel: &AtomicBool,
) -> Result<CandidateScore, FitError> {
    let classes: Vec<usize> = y.iter().map(|&t| usize::from(t >= 0.5)).collect();
    let mut scores = Vec::with_capacity(k);

    for fold in stratified_kfold(&classes, k, config.seed) {
        let x_train = x.select(Axis(0), &fold.train);
        let y_train: Vec<f64> = fold.train.iter().map(|&i| y[i]).collect();
        let model = TrainedModel::fit(algorithm, &x_train, &y_train, config, cancel)?;

        let actual: Vec<u8> = fold.test.iter().map(|&i| classes[i] as u8).collect();
        let predicted: Vec<u8> = fold.test.iter().map(|&i| model.predict(&x.row(i).to_vec())).collect();
        scores.push(ConfusionMatrix::from_labels(&actual, &predicted).accuracy());
    }

    Ok(CandidateScore::from_scores(algorithm, scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::testutil::separable_matrix;

    #[test]
    fn test_cv_on_separable_data() {
        let (x, y) = separable_matrix(25, 3);
        let config = ModelConfig { n_estimators: 10, ..Default::default() };
        let score = cross_val_score(Algorithm::RandomForest, &x, &y, 5, &config, &AtomicBool::new(false)).unwrap();

        assert_eq!(score.fold_scores.len(), 5);
        assert!(score.mean > 0.9, "mean cv accuracy {}", score.mean);
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        assert_eq!(CandidateScore::from_scores(Algorithm::GradientBoosting, vec![]).mean, 0.0);
    }
}
