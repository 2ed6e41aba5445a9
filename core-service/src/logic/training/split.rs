//! Stratified partitioning
//!
//! Both helpers work on class indices (0 = retained, 1 = dropped out) and a
//! fixed seed, so the same labels always give the same partition.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Row positions of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

fn positions_by_class(classes: &[usize]) -> Vec<Vec<usize>> {
    let n_classes = classes.iter().max().map_or(0, |m| m + 1);
    let mut by_class = vec![Vec::new(); n_classes];
    for (pos, &c) in classes.iter().enumerate() {
        by_class[c].push(pos);
    }
    by_class
}

/// Hold out `test_fraction` of every class. A class with at least two rows
/// always lands on both sides.
pub fn stratified_split(classes: &[usize], test_fraction: f64, seed: u64) -> Split {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for mut members in positions_by_class(classes) {
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);

        let n = members.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Split { train, test }
}

/// `k` stratified folds. Each class is shuffled then dealt round-robin, so
/// fold sizes differ by at most one per class. Folds with no test rows are
/// dropped.
pub fn stratified_kfold(classes: &[usize], k: usize, seed: u64) -> Vec<Split> {
    let k = k.max(2).min(classes.len().max(2));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; classes.len()];

    for mut members in positions_by_class(classes) {
        members.shuffle(&mut rng);
        for (i, pos) in members.into_iter().enumerate() {
            fold_of[pos] = i % k;
        }
    }

    (0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..classes.len()).partition(|&pos| fold_of[pos] == fold);
            Split { train, test }
        })
        .filter(|s| !s.test.is_empty() && !s.train.is_empty())
        .collect()
}
