//! Persisted configuration
//!
//! Settings come from an optional JSON file overlaid with `OVERTAKE__*`
//! environment variables (`OVERTAKE__TRIGGERS__FOLLOW_TIME_GAP=1.5`).
//! A missing or broken store never stops the controller: it falls back
//! to defaults.

use crate::error::SettingsError;
use config::{Config, Environment, File, FileFormat};
use overtake_model::OvertakeConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "OVERTAKE";

/// JSON-backed configuration store
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    read_env: bool,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            read_env: true,
        }
    }

    /// Ignore environment overrides
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate
    pub fn load(&self) -> Result<OvertakeConfig, SettingsError> {
        let mut builder = Config::builder().add_source(
            File::new(&self.path.to_string_lossy(), FileFormat::Json).required(false),
        );
        if self.read_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: OvertakeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load, falling back to defaults on any error
    pub fn load_or_default(&self) -> OvertakeConfig {
        match self.load() {
            Ok(config) => {
                info!("Configuration loaded from {}", self.path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Using default configuration, {} unusable: {}",
                    self.path.display(),
                    e
                );
                OvertakeConfig::default()
            }
        }
    }

    /// Persist after an explicit change
    pub fn save(&self, config: &OvertakeConfig) -> Result<(), SettingsError> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, json)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}
