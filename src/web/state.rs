use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::artifacts::{ArtifactStore, TrainedArtifact};
use crate::config::ServingSettings;
use crate::error::{PipelineError, Result};
use crate::predict::{PredictionResult, Predictor};
use crate::types::FeatureFrame;

/// One loaded artifact plus the predictor configured for it. Immutable once
/// built; a reload builds a fresh one and swaps the pointer.
pub struct ForecastService {
    pub artifact: TrainedArtifact,
    predictor: Predictor,
    max_age_days: u32,
}

impl ForecastService {
    pub fn new(artifact: TrainedArtifact, settings: &ServingSettings) -> Self {
        Self {
            artifact,
            predictor: Predictor::new(settings.confidence_policy()),
            max_age_days: settings.max_artifact_age_days,
        }
    }

    /// Rejects stale artifacts before forecasting; in-flight requests on the
    /// previous artifact are unaffected by a concurrent reload.
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<PredictionResult>> {
        self.predictor
            .check_freshness(&self.artifact, self.max_age_days, chrono::Utc::now())?;
        self.predictor.predict(&self.artifact, frame)
    }
}

/// Shared server state. The service slot is None until the first artifact
/// loads; requests arriving before then get NoArtifact.
#[derive(Clone)]
pub struct AppState {
    service: Arc<RwLock<Option<Arc<ForecastService>>>>,
    pub store: Arc<ArtifactStore>,
    pub settings: ServingSettings,
}

impl AppState {
    pub fn new(store: ArtifactStore, settings: ServingSettings) -> Self {
        Self {
            service: Arc::new(RwLock::new(None)),
            store: Arc::new(store),
            settings,
        }
    }

    pub async fn service(&self) -> Result<Arc<ForecastService>> {
        self.service
            .read()
            .await
            .clone()
            .ok_or(PipelineError::NoArtifact)
    }

    /// Loads the latest stored artifact and swaps it in atomically.
    pub async fn reload(&self) -> Result<u64> {
        let artifact = self.store.load_latest()?;
        let version = artifact.version;
        let service = Arc::new(ForecastService::new(artifact, &self.settings));
        *self.service.write().await = Some(service);
        info!("Serving artifact version {}", version);
        Ok(version)
    }
}
