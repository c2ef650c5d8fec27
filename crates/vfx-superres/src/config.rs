use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vfx_core::error::{EngineError, Result};
use vfx_core::types::Dimensions;

use crate::scale::MIN_INPUT;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Construction-time settings for [`SuperResolution`](crate::SuperResolution).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuperResolutionConfig {
    #[serde(default = "default_schema_version")]
    pub config_schema_version: u32,
    /// Binarized at 0.5.
    #[serde(default = "default_strength")]
    pub strength: f32,
    /// Clamped to `[1, 4]` and snapped to the nearest supported factor.
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Size the buffers are first allocated at, before any frame arrives.
    #[serde(default = "default_placeholder")]
    pub placeholder: Dimensions,
    /// Pushed to the effect's model-directory parameter when set.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

fn default_strength() -> f32 {
    1.0
}

fn default_scale() -> f32 {
    1.5
}

fn default_placeholder() -> Dimensions {
    MIN_INPUT
}

impl Default for SuperResolutionConfig {
    fn default() -> Self {
        Self {
            config_schema_version: CONFIG_SCHEMA_VERSION,
            strength: default_strength(),
            scale: default_scale(),
            placeholder: default_placeholder(),
            model_dir: None,
        }
    }
}

impl SuperResolutionConfig {
    pub fn from_json_str(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data).map_err(|err| {
            EngineError::InvalidConfig(format!("Invalid super-resolution config JSON: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|err| {
            EngineError::InvalidConfig(format!(
                "Failed to read super-resolution config from {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.config_schema_version != CONFIG_SCHEMA_VERSION {
            return Err(EngineError::InvalidConfig(format!(
                "Config schema mismatch: expected {}, got {}",
                CONFIG_SCHEMA_VERSION, self.config_schema_version
            )));
        }
        if !self.strength.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "strength must be finite, got {}",
                self.strength
            )));
        }
        if !self.scale.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "scale must be finite, got {}",
                self.scale
            )));
        }
        if self.placeholder.is_empty() {
            return Err(EngineError::InvalidConfig(format!(
                "placeholder size must be non-zero, got {}",
                self.placeholder
            )));
        }
        if let Some(dir) = &self.model_dir
            && dir.as_os_str().is_empty()
        {
            return Err(EngineError::InvalidConfig(
                "model_dir must not be empty when set".into(),
            ));
        }
        Ok(())
    }
}
