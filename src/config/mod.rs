//! Configuration management for cmake-matrix
//!
//! Two files feed a run: the TOML settings (image, paths, command
//! templates) and the YAML build matrix naming the configurations.

pub mod matrix;
pub mod schema;

pub use matrix::{BuildConfig, BuildMatrix};
pub use schema::Settings;

use crate::error::{MatrixError, MatrixResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Settings manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default settings file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cmake-matrix")
            .join("config.toml")
    }

    /// Load settings, using defaults if the file does not exist
    pub async fn load(&self) -> MatrixResult<Settings> {
        if !self.config_path.exists() {
            debug!("Settings file not found, using defaults");
            return Ok(Settings::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load settings from a specific file
    pub async fn load_from_file(&self, path: &Path) -> MatrixResult<Settings> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| MatrixError::io(format!("reading settings from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| MatrixError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the settings file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
