//! Observable timeline clock state.

use serde::Serialize;

/// What the timeline currently shows.
///
/// `current_time` always lies in `[0, duration]`, and `duration` never drops
/// below the configured minimum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineState {
    current_time: f64,
    is_playing: bool,
    duration: f64,
}

impl TimelineState {
    pub fn new(min_duration: f64) -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            duration: min_duration.max(0.0),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Set the playhead, clamped into `[0, duration]`. Returns the stored value.
    pub fn set_current_time(&mut self, t: f64) -> f64 {
        self.current_time = if t.is_nan() {
            0.0
        } else {
            t.clamp(0.0, self.duration)
        };
        self.current_time
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    /// Recompute the duration from the content span, re-clamping the playhead.
    pub fn set_duration(&mut self, content_duration: f64, min_duration: f64) {
        self.duration = content_duration.max(min_duration).max(0.0);
        if self.current_time > self.duration {
            self.current_time = self.duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playhead_is_clamped() {
        let mut state = TimelineState::new(60.0);
        assert_eq!(state.set_current_time(75.0), 60.0);
        assert_eq!(state.set_current_time(-2.0), 0.0);
        assert_eq!(state.set_current_time(f64::NAN), 0.0);
    }

    #[test]
    fn test_shrinking_duration_pulls_playhead_back() {
        let mut state = TimelineState::new(10.0);
        state.set_duration(100.0, 10.0);
        state.set_current_time(80.0);
        state.set_duration(20.0, 10.0);
        assert_eq!(state.duration(), 20.0);
        assert_eq!(state.current_time(), 20.0);
    }
}
