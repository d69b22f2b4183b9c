use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ml::ForestParams;

/// Prefix of environment overrides, e.g. `SOLAR__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "SOLAR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathSettings,
    pub training: TrainingSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Layer the optional TOML file under `SOLAR__*` environment variables.
    /// Every field has a default, so a missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config
            .validate()
            .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(forest_errors) = self.training.forest.validate() {
            errors.extend(forest_errors.into_iter().map(|e| format!("training.forest: {}", e)));
        }
        if !(self.training.test_fraction > 0.0 && self.training.test_fraction < 1.0) {
            errors.push("training.test_fraction must be between 0 and 1".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be > 0".to_string());
        }
        if self.paths.model.as_os_str().is_empty() {
            errors.push("paths.model must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub dataset: PathBuf,
    pub model: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/solar_data.csv"),
            model: PathBuf::from("models/solar_model.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub test_fraction: f64,
    pub forest: ForestParams,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            forest: ForestParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit newline-delimited JSON instead of human-readable lines
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.training.forest.n_trees, 500);
        assert_eq!(config.paths.model, PathBuf::from("models/solar_model.json"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.training.test_fraction, 0.2);
        assert_eq!(config.paths.dataset, PathBuf::from("data/solar_data.csv"));
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[training.forest]\nn_trees = 50\nmax_depth = 12\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.training.forest.n_trees, 50);
        assert_eq!(config.training.forest.max_depth, 12);
        assert_eq!(config.training.forest.seed, 42);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[training]\ntest_fraction = 1.5\n").unwrap();
        assert!(AppConfig::load(&path).is_err());

        let mut config = AppConfig::default();
        config.server.port = 0;
        config.training.forest.max_depth = 0;
        assert_eq!(config.validate().unwrap_err().len(), 2);
    }
}
