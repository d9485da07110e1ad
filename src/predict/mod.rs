use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifacts::TrainedArtifact;
use crate::error::{PipelineError, Result};
use crate::types::FeatureFrame;

const TREND_WINDOW: usize = 5;
const RETURN_COLUMN: &str = "daily_return";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Moderate,
    Low,
}

impl ConfidenceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLabel::High => "high",
            ConfidenceLabel::Moderate => "moderate",
            ConfidenceLabel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendLabel {
    Up,
    Down,
    Neutral,
}

/// Confidence classification thresholds. The score itself is the stored
/// test-set R² from training time, not a per-request interval; the
/// optional fallback covers artifacts without a usable score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePolicy {
    pub high_threshold: f64,
    pub moderate_threshold: f64,
    pub fallback_score: Option<f64>,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            moderate_threshold: 0.6,
            fallback_score: None,
        }
    }
}

impl ConfidencePolicy {
    /// Strictly above high is high; strictly above moderate is moderate;
    /// everything else, boundaries included, is low.
    pub fn classify(&self, score: f64) -> ConfidenceLabel {
        if score > self.high_threshold {
            ConfidenceLabel::High
        } else if score > self.moderate_threshold {
            ConfidenceLabel::Moderate
        } else {
            ConfidenceLabel::Low
        }
    }
}

/// One forecast produced from one feature row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub timestamp: NaiveDate,
    pub forecast: f64,
    pub confidence: ConfidenceLabel,
    pub confidence_score: f64,
    pub trend: TrendLabel,
    /// The raw (unscaled) predictor values this forecast was made from.
    pub features: Vec<f64>,
}

/// Applies a trained artifact to new feature rows.
pub struct Predictor {
    policy: ConfidencePolicy,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            policy: ConfidencePolicy::default(),
        }
    }
}

impl Predictor {
    pub fn new(policy: ConfidencePolicy) -> Self {
        Self { policy }
    }

    /// Produces one result per input row. The frame's predictor columns
    /// must match the artifact's stored column order exactly.
    pub fn predict(
        &self,
        artifact: &TrainedArtifact,
        frame: &FeatureFrame,
    ) -> Result<Vec<PredictionResult>> {
        let frame_predictors = frame.predictor_columns();
        if frame_predictors != artifact.feature_columns {
            return Err(PipelineError::Shape(format!(
                "artifact expects [{}] but input has [{}]",
                artifact.feature_columns.join(", "),
                frame_predictors.join(", ")
            )));
        }

        let score = self.confidence_score(artifact)?;
        let confidence = self.policy.classify(score);
        let trend = trend_signal(frame);

        let predictor_idx: Vec<usize> = artifact
            .feature_columns
            .iter()
            .map(|name| frame.column_index(name).expect("columns checked above"))
            .collect();

        let mut results = Vec::with_capacity(frame.len());
        for row in &frame.rows {
            let raw: Vec<f64> = predictor_idx.iter().map(|&i| row.values[i]).collect();
            let scaled = artifact.scaler.transform_row(&raw)?;
            let forecast = artifact.model.predict_one(&scaled)?;

            results.push(PredictionResult {
                timestamp: row.timestamp,
                forecast,
                confidence,
                confidence_score: score,
                trend,
                features: raw,
            });
        }

        debug!(
            "Produced {} forecasts with confidence {} ({:.4})",
            results.len(),
            confidence.as_str(),
            score
        );

        Ok(results)
    }

    /// Recoverable staleness signal: the artifact still works, but the
    /// caller should consider retraining.
    pub fn check_freshness(
        &self,
        artifact: &TrainedArtifact,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let age = now.signed_duration_since(artifact.trained_at);
        if age.num_days() > i64::from(max_age_days) {
            return Err(PipelineError::StaleArtifact {
                trained_at: artifact.trained_at,
                max_age_days,
            });
        }
        Ok(())
    }

    fn confidence_score(&self, artifact: &TrainedArtifact) -> Result<f64> {
        let r2 = artifact.metrics.r2;
        if r2.is_finite() {
            return Ok(r2);
        }
        self.policy
            .fallback_score
            .ok_or_else(|| PipelineError::Shape("artifact carries no usable score".to_string()))
    }
}

/// Advisory direction from the mean of the trailing daily returns; neutral
/// when the frame carries no return column.
fn trend_signal(frame: &FeatureFrame) -> TrendLabel {
    let Some(idx) = frame.column_index(RETURN_COLUMN) else {
        return TrendLabel::Neutral;
    };
    let tail = frame.tail(TREND_WINDOW);
    if tail.is_empty() {
        return TrendLabel::Neutral;
    }
    let mean: f64 = tail.iter().map(|r| r.values[idx]).sum::<f64>() / tail.len() as f64;
    if mean > 0.0 {
        TrendLabel::Up
    } else {
        TrendLabel::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactId;
    use crate::model::{LinearModel, Metrics, StandardScaler};
    use crate::types::FeatureRow;

    fn artifact(r2: f64) -> TrainedArtifact {
        TrainedArtifact {
            id: ArtifactId("20240102_120000".to_string()),
            version: 1,
            trained_at: Utc::now(),
            target_column: "close".to_string(),
            feature_columns: vec!["ma_5".to_string(), "daily_return".to_string()],
            model: LinearModel {
                coefficients: vec![2.0, 0.5],
                intercept: 1.0,
            },
            scaler: StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
            metrics: Metrics {
                mse: 1.0,
                rmse: 1.0,
                mae: 1.0,
                r2,
                mape: 1.0,
            },
        }
    }

    fn frame(returns: &[f64]) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut frame = FeatureFrame::new(vec![
            "close".to_string(),
            "ma_5".to_string(),
            "daily_return".to_string(),
        ]);
        for (i, r) in returns.iter().enumerate() {
            frame
                .push(FeatureRow {
                    timestamp: start + chrono::Days::new(i as u64),
                    values: vec![100.0, 10.0, *r],
                })
                .unwrap();
        }
        frame
    }

    #[test]
    fn test_confidence_bucketing() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.classify(0.95), ConfidenceLabel::High);
        assert_eq!(policy.classify(0.7), ConfidenceLabel::Moderate);
        assert_eq!(policy.classify(0.3), ConfidenceLabel::Low);
        // Boundaries fall into the lower band.
        assert_eq!(policy.classify(0.8), ConfidenceLabel::Moderate);
        assert_eq!(policy.classify(0.6), ConfidenceLabel::Low);
    }

    #[test]
    fn test_forecast_applies_scaler_and_model() {
        let predictor = Predictor::default();
        let results = predictor.predict(&artifact(0.9), &frame(&[0.01])).unwrap();
        assert_eq!(results.len(), 1);
        // 1.0 + 2.0 * 10.0 + 0.5 * 0.01
        assert!((results[0].forecast - 21.005).abs() < 1e-12);
        assert_eq!(results[0].confidence, ConfidenceLabel::High);
        assert_eq!(results[0].confidence_score, 0.9);
    }

    #[test]
    fn test_trend_from_trailing_returns() {
        let predictor = Predictor::default();
        let up = predictor
            .predict(&artifact(0.9), &frame(&[-0.5, 0.01, 0.02, 0.01, 0.02, 0.01]))
            .unwrap();
        assert_eq!(up[0].trend, TrendLabel::Up);

        let down = predictor
            .predict(&artifact(0.9), &frame(&[0.5, -0.01, -0.02, -0.01, -0.02, -0.01]))
            .unwrap();
        assert_eq!(down[0].trend, TrendLabel::Down);
    }

    #[test]
    fn test_neutral_without_return_column() {
        let mut art = artifact(0.9);
        art.feature_columns = vec!["ma_5".to_string()];
        art.model.coefficients = vec![2.0];
        art.scaler = StandardScaler {
            mean: vec![0.0],
            scale: vec![1.0],
        };

        let mut frame = FeatureFrame::new(vec!["close".to_string(), "ma_5".to_string()]);
        frame
            .push(FeatureRow {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                values: vec![100.0, 10.0],
            })
            .unwrap();

        let results = Predictor::default().predict(&art, &frame).unwrap();
        assert_eq!(results[0].trend, TrendLabel::Neutral);
    }

    #[test]
    fn test_column_mismatch_is_shape_error() {
        let predictor = Predictor::default();
        let mut wrong = frame(&[0.01]);
        wrong.columns[1] = "ma_20".to_string();
        assert!(matches!(
            predictor.predict(&artifact(0.9), &wrong),
            Err(PipelineError::Shape(_))
        ));
    }

    #[test]
    fn test_staleness() {
        let predictor = Predictor::default();
        let mut art = artifact(0.9);
        art.trained_at = Utc::now() - chrono::Duration::days(40);

        assert!(matches!(
            predictor.check_freshness(&art, 30, Utc::now()),
            Err(PipelineError::StaleArtifact { .. })
        ));
        assert!(predictor.check_freshness(&art, 60, Utc::now()).is_ok());
    }
}
