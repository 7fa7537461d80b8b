//! Clock utilities.
//!
//! Two clocks tick independently in the editor: the native media clock of
//! whichever source is loaded, and the application timeline clock. This
//! module provides:
//! - A monotonic session clock anchored at recording start
//! - Drift measurement between the media clock and the timeline clock

use std::time::Instant;

/// Drift, in seconds, below which the two clocks are considered in sync.
pub const SYNC_EPSILON_SECS: f64 = 0.1;

/// A monotonic clock anchored to the moment a recording session started.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the session started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Drift between the timeline clock and a media-derived timeline position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockDrift {
    /// Position currently held by the timeline clock (seconds).
    pub timeline_secs: f64,
    /// Position derived from the media clock (seconds, timeline domain).
    pub media_secs: f64,
}

impl ClockDrift {
    pub fn new(timeline_secs: f64, media_secs: f64) -> Self {
        Self {
            timeline_secs,
            media_secs,
        }
    }

    /// Signed drift (positive = media is ahead of the timeline).
    pub fn drift_secs(&self) -> f64 {
        self.media_secs - self.timeline_secs
    }

    /// Whether the drift is large enough to warrant a correction.
    ///
    /// Strictly greater than: a delta exactly at `epsilon` is in sync.
    pub fn exceeds(&self, epsilon: f64) -> bool {
        self.drift_secs().abs() > epsilon
    }
}
