//! Persisted project snapshot.
//!
//! The surrounding app saves and restores a single JSON document per
//! project. Restored clips may reference sources that no longer resolve;
//! that is reported per clip and never makes the snapshot unloadable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clip::{AudioClip, Clip};
use crate::overlay::TextOverlay;

/// Serialized `{ videoClips, audioClips, textOverlays, projectName }` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub project_name: String,

    /// Ordered video track.
    #[serde(default)]
    pub video_clips: Vec<Clip>,

    #[serde(default)]
    pub audio_clips: Vec<AudioClip>,

    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    /// Last save time (RFC 3339), absent in snapshots written elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

/// A clip whose source cannot currently be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSource {
    pub clip_id: String,
    pub source_url: String,
}

impl ProjectSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            project_name: name.into(),
            ..Self::default()
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save the snapshot as pretty JSON, stamping `saved_at`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        self.saved_at = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Clips violating `0 <= source_in < source_out`, as human-readable messages.
    pub fn validate_clips(&self) -> Vec<String> {
        let mut errors = vec![];
        for clip in &self.video_clips {
            if !clip.is_valid() {
                errors.push(format!(
                    "Video clip {} has invalid trim range [{}, {}]",
                    clip.id, clip.source_in, clip.source_out
                ));
            }
        }
        for audio in &self.audio_clips {
            if !audio.clip.is_valid() {
                errors.push(format!(
                    "Audio clip {} has invalid trim range [{}, {}]",
                    audio.clip.id, audio.clip.source_in, audio.clip.source_out
                ));
            }
            if !(audio.timeline_start >= 0.0) {
                errors.push(format!(
                    "Audio clip {} starts before the timeline ({})",
                    audio.clip.id, audio.timeline_start
                ));
            }
        }
        for overlay in &self.text_overlays {
            if overlay.timeline_end < overlay.timeline_start {
                errors.push(format!(
                    "Overlay {} ends before it starts ({} < {})",
                    overlay.id, overlay.timeline_end, overlay.timeline_start
                ));
            }
        }
        errors
    }

    /// Clips whose local source file is missing.
    ///
    /// Only plain paths and `file://` URLs are checked; remote URLs are
    /// assumed reachable and fail later as per-clip load errors.
    pub fn validate_sources(&self) -> Vec<UnresolvedSource> {
        self.video_clips
            .iter()
            .chain(self.audio_clips.iter().map(|a| &a.clip))
            .filter(|clip| {
                local_path(&clip.source_url)
                    .map(|p| !p.exists())
                    .unwrap_or(false)
            })
            .map(|clip| UnresolvedSource {
                clip_id: clip.id.clone(),
                source_url: clip.source_url.clone(),
            })
            .collect()
    }
}

/// Resolve a source URL to a local path when it refers to the filesystem.
pub fn local_path(source_url: &str) -> Option<PathBuf> {
    if let Some(rest) = source_url.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if source_url.contains("://") || source_url.starts_with("blob:") || source_url.starts_with("data:") {
        return None;
    }
    Some(PathBuf::from(source_url))
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipKind;

    fn sample() -> ProjectSnapshot {
        let mut snapshot = ProjectSnapshot::new("Lesson 1");
        snapshot.video_clips = vec![
            Clip::new("intro", "https://cdn.example.com/intro.mp4", 0.0, 5.0, ClipKind::Video).unwrap(),
            Clip::new("demo", "/definitely/missing/demo.mp4", 2.0, 5.0, ClipKind::Video).unwrap(),
        ];
        snapshot
    }

    #[test]
    fn test_snapshot_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("project.json");

        let mut snapshot = sample();
        snapshot.save(&path).unwrap();
        assert!(snapshot.saved_at.is_some());

        let loaded = ProjectSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_snapshot_reads_app_field_names() {
        let json = r#"{
            "projectName": "Imported",
            "videoClips": [{"id":"a","sourceUrl":"a.mp4","sourceIn":0,"sourceOut":3}],
            "audioClips": [{"id":"m","sourceUrl":"m.mp3","sourceIn":0,"sourceOut":2,"kind":"audio","volume":0.4,"timelineStart":1}],
            "textOverlays": []
        }"#;
        let snapshot: ProjectSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.project_name, "Imported");
        assert_eq!(snapshot.video_clips[0].kind, ClipKind::Video);
        assert_eq!(snapshot.audio_clips[0].clip.volume, Some(0.4));
        assert!((snapshot.audio_clips[0].timeline_start - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_sources_reports_missing_local_files_only() {
        let missing = sample().validate_sources();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].clip_id, "demo");
    }

    #[test]
    fn test_validate_clips_flags_corrupt_ranges() {
        let mut snapshot = sample();
        snapshot.video_clips[0].source_out = 0.0;
        let errors = snapshot.validate_clips();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("intro"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ProjectSnapshot::load("/no/such/project.json").unwrap_err();
        assert!(matches!(err, ProjectError::IoError { .. }));
    }

    #[test]
    fn test_local_path_classification() {
        assert_eq!(local_path("file:///tmp/a.mp4"), Some(PathBuf::from("/tmp/a.mp4")));
        assert_eq!(local_path("clips/a.mp4"), Some(PathBuf::from("clips/a.mp4")));
        assert_eq!(local_path("https://x/a.mp4"), None);
        assert_eq!(local_path("blob:http://x/123"), None);
    }
}
