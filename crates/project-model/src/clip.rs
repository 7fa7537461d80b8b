//! Clip types.
//!
//! A clip references source media plus a trim range. Video clips form one
//! sequential track whose order defines timeline placement; audio clips
//! carry an explicit `timeline_start` and float independently.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::project::ProjectError;

/// What kind of media a clip references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    #[default]
    Video,
    Audio,
}

/// A trimmed reference to source media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,

    /// Location of the source media (URL or filesystem path).
    pub source_url: String,

    /// Trim-in point within the source (seconds).
    pub source_in: f64,

    /// Trim-out point within the source (seconds). Always `> source_in`.
    pub source_out: f64,

    #[serde(default)]
    pub kind: ClipKind,

    /// Linear gain; `None` means unity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Clip {
    /// Create a clip, validating the trim range.
    pub fn new(
        id: impl Into<String>,
        source_url: impl Into<String>,
        source_in: f64,
        source_out: f64,
        kind: ClipKind,
    ) -> Result<Self, ProjectError> {
        validate_range(source_in, source_out)?;
        Ok(Self {
            id: id.into(),
            source_url: source_url.into(),
            source_in,
            source_out,
            kind,
            volume: None,
        })
    }

    /// Create a clip covering `[0, duration]` of the source with a generated id.
    pub fn from_source(
        source_url: impl Into<String>,
        duration: f64,
        kind: ClipKind,
    ) -> Result<Self, ProjectError> {
        Self::new(generate_id("clip"), source_url, 0.0, duration, kind)
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume.max(0.0));
        self
    }

    /// Trimmed duration in seconds. Never negative, even for corrupt data.
    pub fn duration(&self) -> f64 {
        let d = self.source_out - self.source_in;
        if d.is_finite() {
            d.max(0.0)
        } else {
            0.0
        }
    }

    /// Whether this clip satisfies `0 <= source_in < source_out`.
    pub fn is_valid(&self) -> bool {
        validate_range(self.source_in, self.source_out).is_ok()
    }

    /// Effective linear gain.
    pub fn gain(&self) -> f64 {
        self.volume.unwrap_or(1.0)
    }

    /// Change the trim range, rejecting ranges that would break the invariant.
    pub fn trim(&mut self, source_in: f64, source_out: f64) -> Result<(), ProjectError> {
        validate_range(source_in, source_out)?;
        self.source_in = source_in;
        self.source_out = source_out;
        Ok(())
    }

    /// Split at `offset` seconds into the trimmed range.
    ///
    /// `self` keeps the head, the returned clip is the tail. Offsets that would
    /// leave either half empty are rejected.
    pub fn split_at(&mut self, offset: f64) -> Result<Clip, ProjectError> {
        if !(offset > 0.0 && offset < self.duration()) {
            return Err(ProjectError::ValidationError {
                message: format!(
                    "split offset {offset} outside (0, {}) for clip {}",
                    self.duration(),
                    self.id
                ),
            });
        }
        let cut = self.source_in + offset;
        let tail = Clip {
            id: generate_id("clip"),
            source_url: self.source_url.clone(),
            source_in: cut,
            source_out: self.source_out,
            kind: self.kind,
            volume: self.volume,
        };
        self.source_out = cut;
        Ok(tail)
    }
}

/// An audio clip positioned explicitly on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    #[serde(flatten)]
    pub clip: Clip,

    /// Timeline position where the clip starts playing (seconds).
    pub timeline_start: f64,
}

impl AudioClip {
    pub fn new(clip: Clip, timeline_start: f64) -> Result<Self, ProjectError> {
        if !(timeline_start.is_finite() && timeline_start >= 0.0) {
            return Err(ProjectError::ValidationError {
                message: format!("audio clip {} has invalid timeline start {timeline_start}", clip.id),
            });
        }
        Ok(Self {
            clip,
            timeline_start,
        })
    }

    pub fn timeline_end(&self) -> f64 {
        self.timeline_start + self.clip.duration()
    }

    /// Whether timeline time `t` falls within this clip's placement.
    pub fn is_active_at(&self, t: f64) -> bool {
        t >= self.timeline_start && t < self.timeline_end()
    }
}

fn validate_range(source_in: f64, source_out: f64) -> Result<(), ProjectError> {
    if !source_in.is_finite() || !source_out.is_finite() {
        return Err(ProjectError::ValidationError {
            message: format!("non-finite trim range [{source_in}, {source_out}]"),
        });
    }
    if source_in < 0.0 {
        return Err(ProjectError::ValidationError {
            message: format!("source_in must be non-negative, got {source_in}"),
        });
    }
    if source_out <= source_in {
        return Err(ProjectError::ValidationError {
            message: format!("source_out ({source_out}) must exceed source_in ({source_in})"),
        });
    }
    Ok(())
}

/// Generate a process-unique identifier such as `clip-1718200000123-7`.
pub fn generate_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{n}", chrono::Utc::now().timestamp_millis())
}
