//! Standard Scaler
//!
//! Zero-mean, unit-variance scaling fitted on the training split only and
//! persisted next to the model it was fitted for.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Columns with a spread below this are left unscaled
const MIN_SCALE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit per-column mean and population standard deviation
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for column in x.axis_iter(Axis(1)) {
            let m = column.sum() / n;
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std < MIN_SCALE { 1.0 } else { std });
        }

        Self { mean, scale }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Scale a single row. `row.len()` must equal `n_features()`.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.scale[j];
            }
        }
        out
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_centers_and_scales() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&x);

        assert_eq!(scaler.mean, vec![3.0, 10.0]);
        // Constant column keeps scale 1
        assert_eq!(scaler.scale[1], 1.0);

        let scaled = scaler.transform(&x);
        let col0: Vec<f64> = scaled.column(0).to_vec();
        assert!((col0.iter().sum::<f64>()).abs() < 1e-12);
        assert!((col0.iter().map(|v| v * v).sum::<f64>() / 3.0 - 1.0).abs() < 1e-12);
        assert_eq!(scaled[[0, 1]], 0.0);
    }

    #[test]
    fn test_transform_row_matches_matrix_transform() {
        let x = array![[1.0, 2.0], [4.0, 8.0], [7.0, 1.0]];
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x);
        assert_eq!(scaler.transform_row(&[4.0, 8.0]), scaled.row(1).to_vec());
    }

    #[test]
    fn test_bytes_round_trip_is_exact() {
        let x = array![[0.1, 1.0 / 3.0], [0.7, 2.0 / 7.0], [1e-3, 9.99]];
        let scaler = StandardScaler::fit(&x);
        let restored = StandardScaler::from_bytes(&scaler.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, scaler);
    }
}
