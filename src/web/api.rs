use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::types::{FeatureFrame, FeatureRow, TARGET_COLUMN};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub rows: Vec<PredictRow>,
}

/// One feature row keyed by column name. Order-independent on the wire;
/// converted into the artifact's column order before prediction.
#[derive(Debug, Deserialize)]
pub struct PredictRow {
    pub timestamp: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct PredictionDto {
    pub timestamp: NaiveDate,
    pub forecast: f64,
    pub confidence: &'static str,
    pub confidence_score: f64,
    pub trend: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.service().await.is_ok();
    Json(json!({
        "status": "ok",
        "model_ready": ready,
    }))
}

pub async fn get_model_info(State(state): State<AppState>) -> impl IntoResponse {
    let service = match state.service().await {
        Ok(service) => service,
        Err(e) => return error_response(e),
    };
    let artifact = &service.artifact;
    Json(json!({
        "id": artifact.id,
        "version": artifact.version,
        "trained_at": artifact.trained_at,
        "target_column": artifact.target_column,
        "feature_columns": artifact.feature_columns,
        "metrics": artifact.metrics,
    }))
    .into_response()
}

pub async fn post_predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    let service = match state.service().await {
        Ok(service) => service,
        Err(e) => return error_response(e),
    };

    let frame = match build_frame(&request, &service.artifact.feature_columns) {
        Ok(frame) => frame,
        Err(e) => return error_response(e),
    };

    match service.predict(&frame) {
        Ok(results) => {
            let dtos: Vec<PredictionDto> = results
                .into_iter()
                .map(|r| PredictionDto {
                    timestamp: r.timestamp,
                    forecast: r.forecast,
                    confidence: r.confidence.as_str(),
                    confidence_score: r.confidence_score,
                    trend: match r.trend {
                        crate::predict::TrendLabel::Up => "up",
                        crate::predict::TrendLabel::Down => "down",
                        crate::predict::TrendLabel::Neutral => "neutral",
                    },
                })
                .collect();
            Json(json!({ "predictions": dtos })).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn post_reload(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload().await {
        Ok(version) => {
            info!("Reloaded serving artifact to version {}", version);
            Json(json!({ "version": version })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Builds a positional frame from named request rows. Every expected column
/// must be present and no extras allowed, so a schema drift between client
/// and model fails loudly instead of silently reordering values.
fn build_frame(
    request: &PredictRequest,
    feature_columns: &[String],
) -> Result<FeatureFrame, PipelineError> {
    let mut columns = vec![TARGET_COLUMN.to_string()];
    columns.extend(feature_columns.iter().cloned());
    let mut frame = FeatureFrame::new(columns);

    for (i, row) in request.rows.iter().enumerate() {
        let mut values = Vec::with_capacity(feature_columns.len() + 1);
        values.push(f64::NAN);
        for name in feature_columns {
            let value = row.values.get(name).ok_or_else(|| {
                PipelineError::Shape(format!("row {} is missing column '{}'", i, name))
            })?;
            values.push(*value);
        }
        for name in row.values.keys() {
            if name != TARGET_COLUMN && !feature_columns.contains(name) {
                return Err(PipelineError::Shape(format!(
                    "row {} has unexpected column '{}'",
                    i, name
                )));
            }
        }
        frame.push(FeatureRow {
            timestamp: row.timestamp,
            values,
        })?;
    }

    if frame.is_empty() {
        return Err(PipelineError::Shape("request contains no rows".to_string()));
    }
    Ok(frame)
}

/// Maps pipeline failures to HTTP statuses: no model or a stale one is a
/// service condition, a malformed request is the client's fault.
fn error_response(e: PipelineError) -> axum::response::Response {
    let status = match &e {
        PipelineError::NoArtifact | PipelineError::StaleArtifact { .. } => {
            warn!("Request rejected: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
        PipelineError::Shape(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(columns: &[(&str, f64)]) -> PredictRequest {
        PredictRequest {
            rows: vec![PredictRow {
                timestamp: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                values: columns
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_build_frame_orders_by_artifact_columns() {
        let feature_columns = vec!["ma_5".to_string(), "daily_return".to_string()];
        // Wire order deliberately reversed.
        let req = request(&[("daily_return", 0.01), ("ma_5", 101.0)]);

        let frame = build_frame(&req, &feature_columns).unwrap();
        assert_eq!(frame.predictor_columns(), feature_columns);
        assert_eq!(frame.rows[0].values[1], 101.0);
        assert_eq!(frame.rows[0].values[2], 0.01);
    }

    #[test]
    fn test_missing_column_is_shape_error() {
        let feature_columns = vec!["ma_5".to_string(), "daily_return".to_string()];
        let req = request(&[("ma_5", 101.0)]);
        assert!(matches!(
            build_frame(&req, &feature_columns),
            Err(PipelineError::Shape(_))
        ));
    }

    #[test]
    fn test_unexpected_column_is_shape_error() {
        let feature_columns = vec!["ma_5".to_string()];
        let req = request(&[("ma_5", 101.0), ("rsi", 55.0)]);
        assert!(matches!(
            build_frame(&req, &feature_columns),
            Err(PipelineError::Shape(_))
        ));
    }

    #[test]
    fn test_empty_request_rejected() {
        let req = PredictRequest { rows: vec![] };
        assert!(matches!(
            build_frame(&req, &["ma_5".to_string()]),
            Err(PipelineError::Shape(_))
        ));
    }
}
