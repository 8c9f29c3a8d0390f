//! Ridge-regularised linear regression
//!
//! Features are standardised before fitting so the penalty treats columns
//! on different scales equally. Constant columns get a unit scale and end up
//! with a zero weight.

use super::Regressor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default L2 penalty
pub const DEFAULT_RIDGE_PENALTY: f64 = 1.0;

/// Trained ridge model in standardised feature space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeModel {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

/// Ridge regression backend
#[derive(Debug, Clone)]
pub struct RidgeRegressor {
    penalty: f64,
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self {
            penalty: DEFAULT_RIDGE_PENALTY,
        }
    }
}

impl RidgeRegressor {
    pub fn new(penalty: f64) -> Self {
        Self {
            penalty: penalty.max(0.0),
        }
    }
}

impl Regressor for RidgeRegressor {
    type Model = RidgeModel;

    fn name(&self) -> &'static str {
        "ridge"
    }

    fn fit(&self, features: &[Vec<f64>], labels: &[f64]) -> Result<RidgeModel> {
        if features.is_empty() || features.len() != labels.len() {
            return Err(Error::Validation(format!(
                "cannot fit on {} feature rows and {} labels",
                features.len(),
                labels.len()
            )));
        }
        let n = features.len() as f64;
        let dims = features[0].len();
        if features.iter().any(|row| row.len() != dims) {
            return Err(Error::Validation("feature rows have differing widths".into()));
        }

        let mut means = vec![0.0; dims];
        for row in features {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; dims];
        for row in features {
            for j in 0..dims {
                scales[j] += (row[j] - means[j]).powi(2);
            }
        }
        for s in scales.iter_mut() {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        let intercept = labels.iter().sum::<f64>() / n;

        // Normal equations: (ZᵀZ + λI) w = Zᵀ(y - ȳ)
        let mut gram = vec![vec![0.0; dims]; dims];
        let mut rhs = vec![0.0; dims];
        let mut z = vec![0.0; dims];
        for (row, y) in features.iter().zip(labels) {
            for j in 0..dims {
                z[j] = (row[j] - means[j]) / scales[j];
            }
            let centered = y - intercept;
            for i in 0..dims {
                rhs[i] += z[i] * centered;
                for j in i..dims {
                    gram[i][j] += z[i] * z[j];
                }
            }
        }
        for i in 0..dims {
            for j in 0..i {
                gram[i][j] = gram[j][i];
            }
            gram[i][i] += self.penalty.max(1e-9);
        }

        let weights = solve_linear_system(gram, rhs).ok_or_else(|| {
            Error::Validation("feature matrix is singular; cannot fit ridge model".into())
        })?;

        Ok(RidgeModel {
            means,
            scales,
            weights,
            intercept,
        })
    }

    fn predict(&self, model: &RidgeModel, features: &[f64]) -> f64 {
        model.intercept
            + features
                .iter()
                .zip(&model.means)
                .zip(&model.scales)
                .zip(&model.weights)
                .map(|(((x, m), s), w)| w * (x - m) / s)
                .sum::<f64>()
    }

    fn input_width(&self, model: &RidgeModel) -> Option<usize> {
        let width = model.weights.len();
        (model.means.len() == width && model.scales.len() == width).then_some(width)
    }

    /// Absolute weights; features are standardised, so magnitudes compare
    fn importances(&self, model: &RidgeModel) -> Vec<f64> {
        model.weights.iter().map(|w| w.abs()).collect()
    }
}

/// Gaussian elimination with partial pivoting
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
