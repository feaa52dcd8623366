// Engine configuration
// Aggregates the frame, extraction and writer settings; loadable from JSON

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::annotation::FrameSettings;
use crate::codec::WriterSettings;
use crate::samples::ExtractSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Settings shared by a labeling session; missing fields fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub frames: FrameSettings,
    pub extract: ExtractSettings,
    pub writer: WriterSettings,
}

impl EngineConfig {
    /// Serialize config to JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize config from JSON bytes
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Read config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read(path.as_ref())?;
        let config = Self::from_json_bytes(&data)?;
        log::info!("loaded config from '{}'", path.as_ref().display());
        Ok(config)
    }

    /// Write config to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json_bytes()?)?;
        Ok(())
    }
}
