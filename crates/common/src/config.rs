//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::clock::SYNC_EPSILON_SECS;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Timeline geometry and playback sync parameters.
    pub timeline: TimelineConfig,

    /// Recording ingestion parameters.
    pub recording: RecordingDefaults,

    /// Export defaults.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Timeline geometry and sync parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Ruler pixels per timeline second at scale 1.0.
    pub pixels_per_second: f64,

    /// Minimum ruler width in pixels, even for an empty timeline.
    pub min_width_px: f64,

    /// Floor for the timeline duration in seconds.
    pub min_duration_secs: f64,

    /// Minimum delta between media and timeline clocks before a correction.
    pub sync_epsilon_secs: f64,
}

/// Recording ingestion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Base URL of the upload collaborator (`POST {base}/upload`).
    pub upload_base_url: String,

    /// How long the uploader waits before re-checking a missing chunk.
    pub poll_interval_ms: u64,

    /// Expected capture chunk cadence.
    pub chunk_interval_ms: u64,

    /// Per-request timeout for chunk uploads.
    pub upload_timeout_secs: u64,
}

/// Export defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Directory exported files are written to.
    pub output_dir: PathBuf,

    /// Default quality preset name (`low`, `medium`, `high`, `4k`).
    pub quality: String,

    /// Default container format (`mp4`, `webm`, `gif`).
    pub format: String,

    /// Default output frame rate.
    pub fps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipdeck_timeline=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            pixels_per_second: 100.0,
            min_width_px: 1000.0,
            min_duration_secs: 60.0,
            sync_epsilon_secs: SYNC_EPSILON_SECS,
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            upload_base_url: "http://localhost:3000".to_string(),
            poll_interval_ms: 1000,
            chunk_interval_ms: 1000,
            upload_timeout_secs: 30,
        }
    }
}

impl RecordingDefaults {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            output_dir: default_exports_dir(),
            quality: "medium".to_string(),
            format: "mp4".to_string(),
            fps: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clipdeck").join("config.json")
}

fn default_exports_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("clipdeck").join("exports")
}
