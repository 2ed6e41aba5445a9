//! Decision Tree (CART)
//!
//! Binary tree builder shared by the random forest (Gini, leaf = positive
//! fraction) and gradient boosting (squared error on residuals, leaf value
//! supplied by the booster). Traversal uses `<=` on the split threshold.

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Gains below this are treated as "no useful split"
const MIN_GAIN: f64 = 1e-12;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Binary Gini impurity, targets must be 0/1
    Gini,
    /// Variance of the targets
    SquaredError,
}

impl Criterion {
    /// Impurity from running sums over `n` samples
    fn impurity(&self, n: f64, sum: f64, sum_sq: f64) -> f64 {
        if n <= 0.0 {
            return 0.0;
        }
        let mean = sum / n;
        match self {
            Criterion::Gini => 2.0 * mean * (1.0 - mean),
            Criterion::SquaredError => (sum_sq / n - mean * mean).max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    /// Weighted impurity decrease per feature (not normalized)
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

// ============================================================================
// FITTING
// ============================================================================

impl DecisionTree {
    /// Grow a tree over `samples` (row indices into `x`, duplicates allowed).
    ///
    /// `leaf_value` maps the samples reaching a leaf to the value stored there.
    pub fn fit<R, L>(
        x: &Array2<f64>,
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
        criterion: Criterion,
        rng: &mut R,
        leaf_value: L,
    ) -> Self
    where
        R: Rng + ?Sized,
        L: Fn(&[usize]) -> f64,
    {
        let mut tree = Self {
            nodes: Vec::new(),
            n_features: x.ncols(),
            importances: vec![0.0; x.ncols()],
        };
        let builder = Builder {
            x,
            y,
            params,
            criterion,
            root_size: samples.len().max(1) as f64,
            leaf_value: &leaf_value,
        };
        builder.grow(&mut tree, samples.to_vec(), 0, rng);
        tree
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Value of the leaf reached by `row`
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct Builder<'a, L> {
    x: &'a Array2<f64>,
    y: &'a [f64],
    params: &'a TreeParams,
    criterion: Criterion,
    root_size: f64,
    leaf_value: &'a L,
}

impl<'a, L: Fn(&[usize]) -> f64> Builder<'a, L> {
    /// Returns the index of the node created for `samples`
    fn grow<R: Rng + ?Sized>(
        &self,
        tree: &mut DecisionTree,
        samples: Vec<usize>,
        depth: usize,
        rng: &mut R,
    ) -> usize {
        let index = tree.nodes.len();
        tree.nodes.push(Node::Leaf { value: (self.leaf_value)(&samples) });

        let depth_reached = self.params.max_depth.map_or(false, |max| depth >= max);
        if depth_reached || samples.len() < self.params.min_samples_split.max(2) {
            return index;
        }

        let (sum, sum_sq) = self.sums(&samples);
        let n = samples.len() as f64;
        let impurity = self.criterion.impurity(n, sum, sum_sq);
        if impurity <= MIN_GAIN {
            return index;
        }

        let features = self.candidate_features(rng);
        let Some(split) = self.best_split(&samples, &features, impurity) else {
            return index;
        };

        tree.importances[split.feature] += n / self.root_size * split.gain;

        let left = self.grow(tree, split.left, depth + 1, rng);
        let right = self.grow(tree, split.right, depth + 1, rng);
        tree.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn sums(&self, samples: &[usize]) -> (f64, f64) {
        samples.iter().fold((0.0, 0.0), |(s, q), &i| {
            let v = self.y[i];
            (s + v, q + v * v)
        })
    }

    fn candidate_features<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let n_features = self.x.ncols();
        match self.params.max_features {
            Some(k) if k > 0 && k < n_features => {
                let mut picked = rand::seq::index::sample(rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn best_split(&self, samples: &[usize], features: &[usize], impurity: f64) -> Option<SplitCandidate> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let (total_sum, total_sq) = self.sums(samples);

        let mut best: Option<(usize, f64, f64, usize)> = None; // feature, threshold, gain, left size
        let mut sorted = samples.to_vec();

        for &feature in features {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for pos in 0..n - 1 {
                let v = self.y[sorted[pos]];
                left_sum += v;
                left_sq += v * v;

                let here = self.x[[sorted[pos], feature]];
                let next = self.x[[sorted[pos + 1], feature]];
                if here == next {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let imp_left = self.criterion.impurity(n_left as f64, left_sum, left_sq);
                let imp_right = self.criterion.impurity(
                    n_right as f64,
                    total_sum - left_sum,
                    total_sq - left_sq,
                );
                let child = (n_left as f64 * imp_left + n_right as f64 * imp_right) / n as f64;
                let gain = impurity - child;

                if gain > MIN_GAIN && best.map_or(true, |(_, _, g, _)| gain > g) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some((feature, threshold, gain, n_left));
                }
            }
        }

        let (feature, threshold, gain, _) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) =
            samples.iter().copied().partition(|&i| self.x[[i, feature]] <= threshold);

        Some(SplitCandidate { feature, threshold, gain, left, right })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn mean_leaf(y: &[f64]) -> impl Fn(&[usize]) -> f64 + '_ {
        move |samples: &[usize]| {
            if samples.is_empty() {
                0.0
            } else {
                samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
            }
        }
    }

    #[test]
    fn test_single_split_separates_classes() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [8.0, 5.0], [9.0, 5.0]];
        let y = [0.0, 0.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(&x, &y, &[0, 1, 2, 3], &TreeParams::default(), Criterion::Gini, &mut rng, mean_leaf(&y));

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.predict(&[1.5, 5.0]), 0.0);
        assert_eq!(tree.predict(&[8.5, 5.0]), 1.0);
        // Only feature 0 carries information
        assert!(tree.importances()[0] > 0.0);
        assert_eq!(tree.importances()[1], 0.0);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let params = TreeParams { max_depth: Some(1), ..Default::default() };
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(&x, &y, &[0, 1, 2, 3, 4, 5], &params, Criterion::Gini, &mut rng, mean_leaf(&y));
        assert!(tree.node_count() <= 3);
    }

    #[test]
    fn test_pure_node_stays_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [1.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(1);

        let tree = DecisionTree::fit(&x, &y, &[0, 1, 2], &TreeParams::default(), Criterion::Gini, &mut rng, mean_leaf(&y));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[100.0]), 1.0);
    }

    #[test]
    fn test_squared_error_fits_step() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [-1.0, -1.0, 3.0, 3.0];
        let mut rng = StdRng::seed_from_u64(7);

        let tree = DecisionTree::fit(&x, &y, &[0, 1, 2, 3], &TreeParams::default(), Criterion::SquaredError, &mut rng, mean_leaf(&y));
        assert_eq!(tree.predict(&[0.5]), -1.0);
        assert_eq!(tree.predict(&[2.5]), 3.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let x = array![[1.0], [2.0], [8.0], [9.0]];
        let y = [0.0, 0.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(3);
        let tree = DecisionTree::fit(&x, &y, &[0, 1, 2, 3], &TreeParams::default(), Criterion::Gini, &mut rng, mean_leaf(&y));

        let json = serde_json::to_string(&tree).unwrap();
        let restored: DecisionTree = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, tree);
    }
}
