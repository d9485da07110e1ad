use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Evaluation metrics computed on the held-out test partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub mape: f64,
}

impl Metrics {
    pub fn compute(actual: &Array1<f64>, predicted: &Array1<f64>) -> Self {
        let n = actual.len() as f64;

        let mse = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| (a - p).powi(2))
            .sum::<f64>()
            / n;

        let mae = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>()
            / n;

        let mean = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        let ss_res: f64 = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| (a - p).powi(2))
            .sum();
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        let mape = actual
            .iter()
            .zip(predicted.iter())
            .filter(|(a, _)| **a != 0.0)
            .map(|(a, p)| ((a - p) / a).abs())
            .sum::<f64>()
            / n
            * 100.0;

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            mape,
        }
    }
}
