use ndarray::{Array1, Array2};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::model::{LinearModel, Metrics, StandardScaler};
use crate::types::{FeatureFrame, TARGET_COLUMN};

/// A trained forecaster: the linear model, the scaler it expects its input
/// to pass through, the predictor column order, and coefficient-ranked
/// feature importance.
#[derive(Debug, Clone)]
pub struct FittedForecaster {
    pub model: LinearModel,
    pub scaler: StandardScaler,
    pub feature_columns: Vec<String>,
    pub importance: Vec<(String, f64)>,
}

/// Fits the next-step forecaster on the train partition and evaluates it on
/// the test partition. The target for row t is the close of row t + 1, so
/// the last row of each partition carries no label.
pub struct Trainer {
    target_column: String,
}

impl Default for Trainer {
    fn default() -> Self {
        Self {
            target_column: TARGET_COLUMN.to_string(),
        }
    }
}

impl Trainer {
    pub fn fit(&self, train: &FeatureFrame) -> Result<FittedForecaster> {
        let feature_columns = train.predictor_columns();
        let (x, y) = self.supervised_pairs(train, &feature_columns)?;

        if x.nrows() < feature_columns.len() {
            return Err(PipelineError::InsufficientData(format!(
                "{} labeled training rows for {} predictors",
                x.nrows(),
                feature_columns.len()
            )));
        }

        let scaler = StandardScaler::fit(&x);
        let x_scaled = scaler.transform(&x)?;
        let model = LinearModel::fit(&x_scaled, &y)?;

        let mut importance: Vec<(String, f64)> = feature_columns
            .iter()
            .cloned()
            .zip(model.coefficients.iter().copied())
            .collect();
        importance.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .expect("coefficients are finite")
        });

        info!(
            "Fitted forecaster on {} rows, intercept {:.4}",
            x_scaled.nrows(),
            model.intercept
        );
        for (rank, (name, coef)) in importance.iter().take(5).enumerate() {
            info!("  importance {}: {} = {:.4}", rank + 1, name, coef);
        }

        Ok(FittedForecaster {
            model,
            scaler,
            feature_columns,
            importance,
        })
    }

    /// Computes metrics on the test partition with the train-fitted model
    /// and scaler. Never refits anything here.
    pub fn evaluate(&self, fitted: &FittedForecaster, test: &FeatureFrame) -> Result<Metrics> {
        if test.predictor_columns() != fitted.feature_columns {
            return Err(PipelineError::Shape(
                "test partition columns differ from the fitted columns".to_string(),
            ));
        }
        let (x, y) = self.supervised_pairs(test, &fitted.feature_columns)?;
        let x_scaled = fitted.scaler.transform(&x)?;
        let predicted = fitted.model.predict(&x_scaled)?;
        let metrics = Metrics::compute(&y, &predicted);

        info!(
            "Evaluated on {} test rows: rmse {:.4}, mae {:.4}, r2 {:.4}, mape {:.2}%",
            x.nrows(),
            metrics.rmse,
            metrics.mae,
            metrics.r2,
            metrics.mape
        );

        Ok(metrics)
    }

    /// Builds (X, y) where X holds the predictors of rows 0..n-1 and y the
    /// next row's target value.
    fn supervised_pairs(
        &self,
        frame: &FeatureFrame,
        feature_columns: &[String],
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        if frame.len() < 2 {
            return Err(PipelineError::InsufficientData(format!(
                "{} rows cannot form a next-step pair",
                frame.len()
            )));
        }
        let target_idx = frame.column_index(&self.target_column).ok_or_else(|| {
            PipelineError::Schema(format!("target column '{}' missing", self.target_column))
        })?;
        let predictor_idx: Vec<usize> = feature_columns
            .iter()
            .map(|name| {
                frame
                    .column_index(name)
                    .ok_or_else(|| PipelineError::Schema(format!("column '{}' missing", name)))
            })
            .collect::<Result<_>>()?;

        let n = frame.len() - 1;
        let mut x = Array2::<f64>::zeros((n, predictor_idx.len()));
        let mut y = Array1::<f64>::zeros(n);
        for t in 0..n {
            for (j, &col) in predictor_idx.iter().enumerate() {
                x[[t, j]] = frame.rows[t].values[col];
            }
            y[t] = frame.rows[t + 1].values[target_idx];
        }
        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureRow;
    use chrono::NaiveDate;

    fn frame(n: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut frame = FeatureFrame::new(vec!["close".into(), "ma_5".into(), "volume".into()]);
        for i in 0..n {
            let close = 100.0 + i as f64;
            frame
                .push(FeatureRow {
                    timestamp: start + chrono::Days::new(i as u64),
                    values: vec![close, close - 2.0, 1000.0 + 3.0 * i as f64],
                })
                .unwrap();
        }
        frame
    }

    #[test]
    fn test_fit_learns_next_step_target() {
        let trainer = Trainer::default();
        let fitted = trainer.fit(&frame(40)).unwrap();
        assert_eq!(fitted.feature_columns, vec!["ma_5", "volume"]);

        // Noiseless linear relation: test partition should score ~1.
        let metrics = trainer.evaluate(&fitted, &frame(40)).unwrap();
        assert!(metrics.r2 > 0.999, "r2 was {}", metrics.r2);
        assert!(metrics.rmse < 1e-3);
    }

    #[test]
    fn test_importance_sorted_by_magnitude() {
        let trainer = Trainer::default();
        let fitted = trainer.fit(&frame(40)).unwrap();
        for pair in fitted.importance.windows(2) {
            assert!(pair[0].1.abs() >= pair[1].1.abs());
        }
    }

    #[test]
    fn test_insufficient_rows() {
        let trainer = Trainer::default();
        assert!(matches!(
            trainer.fit(&frame(1)),
            Err(PipelineError::InsufficientData(_))
        ));
        // Two rows make one labeled pair, still fewer than the predictors.
        assert!(matches!(
            trainer.fit(&frame(2)),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_evaluate_rejects_different_columns() {
        let trainer = Trainer::default();
        let fitted = trainer.fit(&frame(40)).unwrap();

        let mut other = FeatureFrame::new(vec!["close".into(), "ma_20".into()]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for i in 0..5 {
            other
                .push(FeatureRow {
                    timestamp: start + chrono::Days::new(i),
                    values: vec![100.0, 98.0],
                })
                .unwrap();
        }
        assert!(matches!(
            trainer.evaluate(&fitted, &other),
            Err(PipelineError::Shape(_))
        ));
    }
}
