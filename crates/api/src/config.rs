//! Application configuration
//!
//! Layered: built-in defaults, then an optional TOML/YAML/JSON file, then
//! `DROWSY_`-prefixed environment variables with `__` between sections,
//! e.g. `DROWSY_THRESHOLDS__CONSEC_FRAMES=8`.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use alerting::AlertConfig;
use camera_capture::SourceConfig;
use config::{Config, Environment, File};
use dms::{LandmarkConfig, ThresholdConfig};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::ApiError;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Streaming loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Mirror frames horizontally (self-facing camera)
    pub mirror: bool,
    /// JPEG quality of the video feed (1-100)
    pub jpeg_quality: u8,
    /// Encoded frames buffered per viewer before old ones are dropped
    pub frame_channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mirror: true,
            jpeg_quality: 80,
            frame_channel_capacity: 4,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Parsed `level`
    pub fn max_level(&self) -> Result<Level, ApiError> {
        Level::from_str(&self.level).map_err(|_| {
            ApiError::InvalidConfig(format!(
                "logging.level must be trace, debug, info, warn or error, got {:?}",
                self.level
            ))
        })
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub thresholds: ThresholdConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub landmarks: LandmarkConfig,
    pub alert: AlertConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ApiError> {
        Self::load_from(path, None)
    }

    /// Load with an explicit environment map in place of the process environment
    pub fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ApiError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("DROWSY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation; any failure is fatal
    pub fn validate(&self) -> Result<(), ApiError> {
        self.thresholds.validate()?;
        if !(1..=100).contains(&self.pipeline.jpeg_quality) {
            return Err(ApiError::InvalidConfig(format!(
                "pipeline.jpeg_quality must be 1-100, got {}",
                self.pipeline.jpeg_quality
            )));
        }
        if self.pipeline.frame_channel_capacity == 0 {
            return Err(ApiError::InvalidConfig(
                "pipeline.frame_channel_capacity must be positive".into(),
            ));
        }
        self.logging.max_level()?;
        Ok(())
    }
}
