use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::predict::ConfidencePolicy;

/// Process configuration, loaded once at startup from a TOML file. Every
/// field has a validated default; validation reports all offending fields
/// at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataSettings,
    pub training: TrainingSettings,
    pub artifacts: ArtifactSettings,
    pub serving: ServingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory for the optional partition exports.
    pub export_dir: String,
    pub export_partitions: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            export_dir: "processed_data".to_string(),
            export_partitions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub test_fraction: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self { test_fraction: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub dir: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dir: "models".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingSettings {
    pub port: u16,
    /// An artifact older than this is reported stale; callers may retrain.
    pub max_artifact_age_days: u32,
    pub confidence_high_threshold: f64,
    pub confidence_moderate_threshold: f64,
    /// Score used when an artifact carries no usable evaluation score.
    pub confidence_fallback_score: Option<f64>,
}

impl Default for ServingSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            max_artifact_age_days: 30,
            confidence_high_threshold: 0.8,
            confidence_moderate_threshold: 0.6,
            confidence_fallback_score: None,
        }
    }
}

impl ServingSettings {
    pub fn confidence_policy(&self) -> ConfidencePolicy {
        ConfidencePolicy {
            high_threshold: self.confidence_high_threshold,
            moderate_threshold: self.confidence_moderate_threshold,
            fallback_score: self.confidence_fallback_score,
        }
    }
}

impl AppConfig {
    /// Loads the file when present, falling back to defaults otherwise.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.training.test_fraction > 0.0 && self.training.test_fraction < 1.0) {
            errors.push("training.test_fraction must be between 0 and 1 exclusive".to_string());
        }
        if self.serving.max_artifact_age_days == 0 {
            errors.push("serving.max_artifact_age_days must be > 0".to_string());
        }
        if !(self.serving.confidence_high_threshold > 0.0
            && self.serving.confidence_high_threshold <= 1.0)
        {
            errors.push("serving.confidence_high_threshold must be in (0, 1]".to_string());
        }
        if self.serving.confidence_moderate_threshold >= self.serving.confidence_high_threshold {
            errors.push(
                "serving.confidence_moderate_threshold must be below the high threshold"
                    .to_string(),
            );
        }
        if let Some(score) = self.serving.confidence_fallback_score {
            if !(0.0..=1.0).contains(&score) {
                errors.push("serving.confidence_fallback_score must be in [0, 1]".to_string());
            }
        }
        if self.artifacts.dir.is_empty() {
            errors.push("artifacts.dir must not be empty".to_string());
        }
        if self.data.export_dir.is_empty() {
            errors.push("data.export_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = AppConfig::default();
        config.training.test_fraction = 1.5;
        config.serving.max_artifact_age_days = 0;
        config.serving.confidence_moderate_threshold = 0.9;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [training]
            test_fraction = 0.3

            [serving]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.training.test_fraction, 0.3);
        assert_eq!(config.serving.port, 8080);
        assert_eq!(config.artifacts.dir, "models");
        assert_eq!(config.serving.max_artifact_age_days, 30);
    }

    #[test]
    fn test_policy_conversion() {
        let settings = ServingSettings::default();
        let policy = settings.confidence_policy();
        assert_eq!(policy.high_threshold, 0.8);
        assert_eq!(policy.moderate_threshold, 0.6);
        assert_eq!(policy.fallback_score, None);
    }
}
