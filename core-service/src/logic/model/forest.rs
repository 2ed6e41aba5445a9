//! Random Forest (bagging ensemble)
//!
//! Bootstrap-sampled Gini trees with √features candidates per split.
//! Each tree has its own seed derived from the forest seed, so the result
//! does not depend on fitting order.

use std::sync::atomic::AtomicBool;

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::classifier::{check_cancel, check_shape, normalize, Algorithm, Classifier, FitError};
use super::tree::{Criterion, DecisionTree, TreeParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub tree: TreeParams,
    pub bootstrap: bool,
    pub seed: u64,
}

impl ForestConfig {
    /// Defaults for `n_features` inputs
    pub fn for_features(n_features: usize) -> Self {
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);
        Self {
            n_estimators: 100,
            tree: TreeParams {
                max_features: Some(max_features),
                ..TreeParams::default()
            },
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(x: &Array2<f64>, y: &[f64], config: &ForestConfig, cancel: &AtomicBool) -> Result<Self, FitError> {
        check_shape(x, y)?;
        let n = x.nrows();
        let n_features = x.ncols();
        let n_estimators = config.n_estimators.max(1);

        let mut trees = Vec::with_capacity(n_estimators);
        let mut importances = vec![0.0; n_features];

        for t in 0..n_estimators {
            check_cancel(cancel)?;

            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
            let samples: Vec<usize> = if config.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };

            let tree = DecisionTree::fit(x, y, &samples, &config.tree, Criterion::Gini, &mut rng, |leaf| {
                positive_fraction(y, leaf)
            });

            for (total, v) in importances.iter_mut().zip(normalize(tree.importances().to_vec())) {
                *total += v;
            }
            trees.push(tree);
        }

        Ok(Self {
            trees,
            n_features,
            feature_importances: normalize(importances),
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn positive_fraction(y: &[f64], samples: &[usize]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
}

impl Classifier for RandomForest {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        (total / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::RandomForest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::testutil::separable_matrix;

    fn small_config(n_features: usize) -> ForestConfig {
        ForestConfig { n_estimators: 15, ..ForestConfig::for_features(n_features) }
    }

    #[test]
    fn test_max_features_is_sqrt() {
        assert_eq!(ForestConfig::for_features(9).tree.max_features, Some(3));
        assert_eq!(ForestConfig::for_features(1).tree.max_features, Some(1));
    }

    #[test]
    fn test_forest_separates_synthetic_data() {
        let (x, y) = separable_matrix(40, 11);
        let forest = RandomForest::fit(&x, &y, &small_config(x.ncols()), &AtomicBool::new(false)).unwrap();

        assert_eq!(forest.n_trees(), 15);
        let correct = x
            .rows()
            .into_iter()
            .zip(y.iter())
            .filter(|(row, label)| f64::from(forest.predict(&row.to_vec())) == **label)
            .count();
        assert_eq!(correct, y.len());

        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = separable_matrix(30, 4);
        let config = small_config(x.ncols());
        let a = RandomForest::fit(&x, &y, &config, &AtomicBool::new(false)).unwrap();
        let b = RandomForest::fit(&x, &y, &config, &AtomicBool::new(false)).unwrap();
        assert_eq!(a, b);
    }
}
