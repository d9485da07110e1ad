use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const MIN_SCALE: f64 = 1e-10;

/// Per-column z-score scaler. Fitted once on the training partition; the
/// same mean/scale pair travels with the artifact and is re-applied at
/// prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let mean = x
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        let scale = x.std_axis(Axis(0), 0.0).to_vec();
        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(PipelineError::Shape(format!(
                "scaler fitted on {} columns, input has {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        let mut out = x.clone();
        for j in 0..self.mean.len() {
            let scale = self.scale[j];
            for v in out.column_mut(j).iter_mut() {
                // Constant columns carry no signal; map them to zero.
                *v = if scale > MIN_SCALE {
                    (*v - self.mean[j]) / scale
                } else {
                    0.0
                };
            }
        }
        Ok(out)
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(PipelineError::Shape(format!(
                "scaler fitted on {} columns, row has {}",
                self.mean.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, v)| {
                if self.scale[j] > MIN_SCALE {
                    (v - self.mean[j]) / self.scale[j]
                } else {
                    0.0
                }
            })
            .collect())
    }
}
