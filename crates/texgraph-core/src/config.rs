//! Engine configuration loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::validate_resolution;
use crate::preview::DisplayMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by the evaluation pool and the preview surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Evaluation resolution as `[width, height]`.
    pub resolution: [u32; 2],
    /// Background evaluation threads.
    pub workers: usize,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Edge length of the square preview surface.
    pub size: u32,
    pub mode: DisplayMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution: [256, 256],
            workers: 1,
            preview: PreviewConfig::default(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            size: 256,
            mode: DisplayMode::Checker,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let [width, height] = self.resolution;
        validate_resolution(width, height).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate_resolution(self.preview.size, self.preview.size)
            .map_err(|e| ConfigError::Invalid(format!("preview.size: {e}")))?;
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.resolution[0], self.resolution[1])
    }
}
