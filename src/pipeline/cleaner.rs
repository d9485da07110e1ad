use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{FeatureFrame, TARGET_COLUMN};

/// Per-column statistics fitted on the training partition only. The same
/// values clean both partitions; nothing is ever recomputed from test data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningStats {
    pub columns: Vec<String>,
    pub median: Vec<f64>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

pub struct Cleaner;

impl Cleaner {
    /// Fits imputation and outlier statistics from the train partition.
    /// Medians come from the finite values; mean and standard deviation are
    /// computed after median imputation. The target column is skipped.
    pub fn fit(train: &FeatureFrame) -> CleaningStats {
        let columns = train.predictor_columns();
        let mut medians = Vec::with_capacity(columns.len());
        let mut means = Vec::with_capacity(columns.len());
        let mut stds = Vec::with_capacity(columns.len());

        for name in &columns {
            let idx = train.column_index(name).expect("predictor column exists");
            let raw = train.column_values(idx);

            let med = median_of_finite(&raw);
            let imputed: Vec<f64> = raw
                .iter()
                .map(|v| if v.is_finite() { *v } else { med })
                .collect();

            let n = imputed.len() as f64;
            let mean = imputed.iter().sum::<f64>() / n.max(1.0);
            let std = if imputed.len() > 1 {
                let var = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                var.sqrt()
            } else {
                0.0
            };

            medians.push(med);
            means.push(mean);
            stds.push(std);
        }

        CleaningStats {
            columns,
            median: medians,
            mean: means,
            std: stds,
        }
    }

    /// Applies the fitted statistics to a frame. Non-finite values become
    /// the train median everywhere; 3-sigma outlier clipping to the median
    /// runs only when `clip_outliers` is set (the train partition).
    pub fn apply(
        frame: &FeatureFrame,
        stats: &CleaningStats,
        clip_outliers: bool,
    ) -> Result<FeatureFrame> {
        if frame.predictor_columns() != stats.columns {
            return Err(PipelineError::Shape(format!(
                "cleaning statistics cover [{}] but frame has [{}]",
                stats.columns.join(", "),
                frame.predictor_columns().join(", ")
            )));
        }

        let mut cleaned = frame.clone();
        let mut imputed = 0usize;
        let mut clipped = 0usize;

        for (stat_idx, name) in stats.columns.iter().enumerate() {
            let col = frame.column_index(name).expect("checked above");
            let med = stats.median[stat_idx];
            let lower = stats.mean[stat_idx] - 3.0 * stats.std[stat_idx];
            let upper = stats.mean[stat_idx] + 3.0 * stats.std[stat_idx];

            for row in cleaned.rows.iter_mut() {
                let v = &mut row.values[col];
                if !v.is_finite() {
                    *v = med;
                    imputed += 1;
                } else if clip_outliers && (*v < lower || *v > upper) {
                    *v = med;
                    clipped += 1;
                }
            }
        }

        if imputed > 0 || clipped > 0 {
            debug!(
                "Cleaned frame: {} values imputed, {} outliers clipped",
                imputed, clipped
            );
        }

        Ok(cleaned)
    }
}

fn median_of_finite(values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return 0.0;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).expect("finite values compare"));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[mid]
    }
}
