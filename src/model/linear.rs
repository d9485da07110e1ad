use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Ordinary least squares fit, solved in closed form through the normal
/// equations with a Cholesky factorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Fits coefficients and intercept for `y ~ X`. The intercept is folded
    /// into the design matrix as a leading column of ones.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let n = x.nrows();
        let p = x.ncols();
        if n != y.len() {
            return Err(PipelineError::Shape(format!(
                "{} feature rows but {} targets",
                n,
                y.len()
            )));
        }
        if n < p {
            return Err(PipelineError::InsufficientData(format!(
                "{} training rows for {} predictors",
                n, p
            )));
        }

        let mut design = Array2::<f64>::ones((n, p + 1));
        design.slice_mut(ndarray::s![.., 1..]).assign(x);

        let xt = design.t();
        let mut xtx = xt.dot(&design);
        let xty = xt.dot(y);

        // Small ridge on the diagonal keeps near-constant columns solvable.
        for i in 0..p + 1 {
            xtx[[i, i]] += 1e-10;
        }

        let beta = cholesky_solve(&xtx, &xty)?;

        Ok(Self {
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PipelineError::Shape(format!(
                "model has {} coefficients but input has {} columns",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        let coef = Array1::from_vec(self.coefficients.clone());
        Ok(x.dot(&coef) + self.intercept)
    }

    pub fn predict_one(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(PipelineError::Shape(format!(
                "model has {} coefficients but input row has {} values",
                self.coefficients.len(),
                row.len()
            )));
        }
        let dot: f64 = row
            .iter()
            .zip(self.coefficients.iter())
            .map(|(v, c)| v * c)
            .sum();
        Ok(dot + self.intercept)
    }
}

/// Solves A x = b for symmetric positive definite A.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(PipelineError::InsufficientData(
                        "normal matrix is rank-deficient".to_string(),
                    ));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward solve L z = b.
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Back solve L' x = z.
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Ok(x)
}
