//! Gradient Boosting (log-loss)
//!
//! Shallow squared-error trees fitted to the log-loss gradient, with one
//! Newton step per leaf. Raw score starts at the log-odds of the prior.

use std::sync::atomic::AtomicBool;

use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::classifier::{check_cancel, check_shape, normalize, Algorithm, Classifier, FitError};
use super::tree::{Criterion, DecisionTree, TreeParams};

/// Keeps the prior log-odds finite for single-class input
const PRIOR_EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoosting {
    pub fn fit(x: &Array2<f64>, y: &[f64], config: &BoostingConfig, cancel: &AtomicBool) -> Result<Self, FitError> {
        check_shape(x, y)?;
        let n = x.nrows();
        let n_features = x.ncols();

        let prior = (y.iter().sum::<f64>() / n as f64).clamp(PRIOR_EPS, 1.0 - PRIOR_EPS);
        let init = (prior / (1.0 - prior)).ln();

        let params = TreeParams {
            max_depth: Some(config.max_depth.max(1)),
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: None,
        };
        let samples: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut raw = vec![init; n];
        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut importances = vec![0.0; n_features];

        for _ in 0..config.n_estimators {
            check_cancel(cancel)?;

            let prob: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
            let residual: Vec<f64> = y.iter().zip(prob.iter()).map(|(t, p)| t - p).collect();

            let tree = DecisionTree::fit(x, &residual, &samples, &params, Criterion::SquaredError, &mut rng, |leaf| {
                newton_step(&residual, &prob, leaf)
            });

            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += config.learning_rate * tree.predict(&row.to_vec());
            }
            for (total, v) in importances.iter_mut().zip(tree.importances()) {
                *total += v;
            }
            trees.push(tree);
        }

        Ok(Self {
            init,
            learning_rate: config.learning_rate,
            trees,
            n_features,
            feature_importances: normalize(importances),
        })
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        self.init + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

/// Σ residual / Σ p(1-p) over the leaf
fn newton_step(residual: &[f64], prob: &[f64], leaf: &[usize]) -> f64 {
    let numerator: f64 = leaf.iter().map(|&i| residual[i]).sum();
    let denominator: f64 = leaf.iter().map(|&i| prob[i] * (1.0 - prob[i])).sum();
    if denominator.abs() < 1e-150 {
        0.0
    } else {
        numerator / denominator
    }
}

impl Classifier for GradientBoosting {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row)).clamp(0.0, 1.0)
    }

    fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::GradientBoosting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::testutil::separable_matrix;

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
    }

    #[test]
    fn test_boosting_separates_synthetic_data() {
        let (x, y) = separable_matrix(40, 21);
        let config = BoostingConfig { n_estimators: 30, ..Default::default() };
        let model = GradientBoosting::fit(&x, &y, &config, &AtomicBool::new(false)).unwrap();

        assert_eq!(model.n_stages(), 30);
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            let p = model.predict_proba(&row.to_vec());
            if label == 1.0 {
                assert!(p > 0.5, "positive row scored {}", p);
            } else {
                assert!(p < 0.5, "negative row scored {}", p);
            }
        }

        let sum: f64 = model.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_class_input_stays_finite() {
        let (x, _) = separable_matrix(10, 2);
        let y = vec![0.0; x.nrows()];
        let model = GradientBoosting::fit(&x, &y, &BoostingConfig::default(), &AtomicBool::new(false)).unwrap();
        let p = model.predict_proba(&x.row(0).to_vec());
        assert!(p.is_finite());
        assert!(p < 0.01);
    }
}
