//! Export settings and quality presets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::project::ProjectError;

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Webm,
    Gif,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "video/mp4",
            ExportFormat::Webm => "video/webm",
            ExportFormat::Gif => "image/gif",
        }
    }

    /// Whether the container can carry an audio stream.
    pub fn supports_audio(self) -> bool {
        !matches!(self, ExportFormat::Gif)
    }
}

impl FromStr for ExportFormat {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(ExportFormat::Mp4),
            "webm" => Ok(ExportFormat::Webm),
            "gif" => Ok(ExportFormat::Gif),
            other => Err(ProjectError::ValidationError {
                message: format!("unknown export format '{other}' (expected mp4, webm, gif)"),
            }),
        }
    }
}

/// Named quality preset. Output is always resampled to the preset size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
    #[serde(rename = "4k")]
    Uhd4k,
}

/// Concrete encoding target for a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySpec {
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl QualitySpec {
    /// Bitrate in bits per second.
    pub fn bitrate_bps(&self) -> f64 {
        self.bitrate_kbps as f64 * 1000.0
    }

    /// ffmpeg-style bitrate string, e.g. `2500k`.
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 4] = [
        QualityPreset::Low,
        QualityPreset::Medium,
        QualityPreset::High,
        QualityPreset::Uhd4k,
    ];

    pub fn spec(self) -> QualitySpec {
        match self {
            QualityPreset::Low => QualitySpec {
                width: 854,
                height: 480,
                bitrate_kbps: 1000,
            },
            QualityPreset::Medium => QualitySpec {
                width: 1280,
                height: 720,
                bitrate_kbps: 2500,
            },
            QualityPreset::High => QualitySpec {
                width: 1920,
                height: 1080,
                bitrate_kbps: 5000,
            },
            QualityPreset::Uhd4k => QualitySpec {
                width: 3840,
                height: 2160,
                bitrate_kbps: 15000,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityPreset::Low => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "high",
            QualityPreset::Uhd4k => "4k",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityPreset {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityPreset::Low),
            "medium" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            "4k" | "uhd" => Ok(QualityPreset::Uhd4k),
            other => Err(ProjectError::ValidationError {
                message: format!("unknown quality preset '{other}' (expected low, medium, high, 4k)"),
            }),
        }
    }
}

/// Settings for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub format: ExportFormat,
    pub quality: QualityPreset,
    pub fps: u32,
    pub include_audio: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4,
            quality: QualityPreset::Medium,
            fps: 30,
            include_audio: true,
        }
    }
}

impl ExportSettings {
    pub fn spec(&self) -> QualitySpec {
        self.quality.spec()
    }

    /// Audio is only encoded when requested and the container supports it.
    pub fn wants_audio(&self) -> bool {
        self.include_audio && self.format.supports_audio()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_table() {
        let medium = QualityPreset::Medium.spec();
        assert_eq!((medium.width, medium.height), (1280, 720));
        assert_eq!(medium.bitrate_arg(), "2500k");
        assert!((medium.bitrate_bps() - 2_500_000.0).abs() < 1e-6);
        assert_eq!(QualityPreset::Uhd4k.spec().width, 3840);
    }

    #[test]
    fn test_presets_grow_monotonically() {
        let specs: Vec<_> = QualityPreset::ALL.iter().map(|p| p.spec()).collect();
        for pair in specs.windows(2) {
            assert!(pair[1].width > pair[0].width);
            assert!(pair[1].bitrate_kbps > pair[0].bitrate_kbps);
        }
    }

    #[test]
    fn test_preset_parse_and_serde_names() {
        assert_eq!("4K".parse::<QualityPreset>().unwrap(), QualityPreset::Uhd4k);
        assert!("ultra".parse::<QualityPreset>().is_err());
        assert_eq!(serde_json::to_string(&QualityPreset::Uhd4k).unwrap(), "\"4k\"");
    }

    #[test]
    fn test_gif_never_wants_audio() {
        let settings = ExportSettings {
            format: ExportFormat::Gif,
            include_audio: true,
            ..ExportSettings::default()
        };
        assert!(!settings.wants_audio());
        assert_eq!(settings.format.extension(), "gif");
    }
}
