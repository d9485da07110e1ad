use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::model::{LinearModel, Metrics, StandardScaler};

const FILE_PREFIX: &str = "forecast_model_";
const FILE_EXTENSION: &str = "json";

/// Second-precision creation timestamp, also the artifact's file name stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    fn now() -> Self {
        Self(Utc::now().format("%Y%m%d_%H%M%S").to_string())
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted trained model with everything prediction needs: scaler,
/// column order, and the evaluation metrics its confidence score comes
/// from. Write-once; superseded by higher versions, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub id: ArtifactId,
    /// Monotonic counter embedded in the artifact itself; latest-artifact
    /// selection keys on this, never on file modification times.
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub target_column: String,
    pub feature_columns: Vec<String>,
    pub model: LinearModel,
    pub scaler: StandardScaler,
    pub metrics: Metrics,
}

/// One JSON file per artifact in a flat directory.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists a new artifact. Version is one past the greatest stored
    /// version; the file is created exclusively so an existing artifact can
    /// never be overwritten.
    pub fn save(
        &self,
        model: LinearModel,
        scaler: StandardScaler,
        feature_columns: Vec<String>,
        target_column: String,
        metrics: Metrics,
    ) -> Result<ArtifactId> {
        fs::create_dir_all(&self.dir)?;

        let version = self
            .read_all()?
            .iter()
            .map(|a| a.version)
            .max()
            .unwrap_or(0)
            + 1;
        let id = ArtifactId::now();

        let artifact = TrainedArtifact {
            id: id.clone(),
            version,
            trained_at: Utc::now(),
            target_column,
            feature_columns,
            model,
            scaler,
            metrics,
        };

        let path = self.path_for(&id, version);
        let json = serde_json::to_string_pretty(&artifact)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        let mut file = options.open(&path)?;
        use std::io::Write;
        file.write_all(json.as_bytes())?;

        info!(
            "Saved artifact {} (version {}) to {}",
            id,
            version,
            path.display()
        );

        Ok(id)
    }

    /// Returns the artifact with the greatest embedded version, breaking
    /// ties by id. Fails with NoArtifact when the store holds nothing.
    pub fn load_latest(&self) -> Result<TrainedArtifact> {
        let mut artifacts = self.read_all()?;
        artifacts.sort_by(|a, b| (a.version, &a.id).cmp(&(b.version, &b.id)));
        artifacts.pop().ok_or(PipelineError::NoArtifact)
    }

    /// All stored artifacts, newest first.
    pub fn list(&self) -> Result<Vec<TrainedArtifact>> {
        let mut artifacts = self.read_all()?;
        artifacts.sort_by(|a, b| (b.version, &b.id).cmp(&(a.version, &a.id)));
        Ok(artifacts)
    }

    fn path_for(&self, id: &ArtifactId, version: u64) -> PathBuf {
        // Two trainings inside one second would collide on the timestamp
        // alone; the version suffix disambiguates while keeping the
        // conventional prefix.
        let mut path = self.dir.join(format!("{}{}.{}", FILE_PREFIX, id, FILE_EXTENSION));
        if path.exists() {
            path = self
                .dir
                .join(format!("{}{}_v{}.{}", FILE_PREFIX, id, version, FILE_EXTENSION));
        }
        path
    }

    fn read_all(&self) -> Result<Vec<TrainedArtifact>> {
        let mut artifacts = Vec::new();
        if !self.dir.exists() {
            return Ok(artifacts);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_artifact = path
                .extension()
                .map(|e| e == FILE_EXTENSION)
                .unwrap_or(false)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX))
                    .unwrap_or(false);
            if !is_artifact {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(PipelineError::from)
                .and_then(|s| serde_json::from_str::<TrainedArtifact>(&s).map_err(PipelineError::from))
            {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => warn!("Skipping unreadable artifact {}: {}", path.display(), e),
            }
        }
        Ok(artifacts)
    }
}
