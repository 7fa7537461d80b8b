//! Playback controller.
//!
//! Drives exactly one media element so that it shows whatever the timeline
//! says should be visible. Two entry points feed it:
//!
//! - [`PlaybackController::seek`] when the timeline moves from outside
//!   (scrubber drag, keyboard), which may swap or seek the media element;
//! - [`PlaybackController::on_source_time_update`] on every native media
//!   tick, which may publish a new timeline time.
//!
//! Both directions are gated by the sync epsilon so a media-driven timeline
//! write can never trigger a timeline-driven media seek and vice versa.

use clipdeck_common::clock::ClockDrift;
use clipdeck_common::config::TimelineConfig;
use clipdeck_project_model::clip::{AudioClip, Clip};
use clipdeck_project_model::overlay::{visible_overlays, TextOverlay};

use crate::segments::{build_playback_segments, content_duration, PlaybackSegment};
use crate::state::TimelineState;

/// The single native player the controller drives.
///
/// `load` and `seek` start asynchronous work; the host reports completion
/// through [`PlaybackController::on_seek_complete`] and load failures through
/// [`PlaybackController::on_source_error`].
pub trait MediaElement {
    /// URL currently loaded, if any.
    fn current_source(&self) -> Option<&str>;

    /// Current position of the native clock, in source seconds.
    fn position(&self) -> f64;

    /// Replace the loaded source. Synchronous failures are reported here.
    fn load(&mut self, url: &str) -> Result<(), MediaError>;

    fn seek(&mut self, source_time: f64);

    fn play(&mut self) -> Result<(), MediaError>;

    fn pause(&mut self);
}

/// Failure reported by a media element.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct MediaError {
    pub message: String,
}

impl MediaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Failed to load source {url}: {message}")]
    SourceLoad { url: String, message: String },

    #[error("Nothing to play: the timeline has no segments")]
    NothingToPlay,
}

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No segments.
    Idle,
    /// A source is loaded but the native clock is not advancing.
    Positioned,
    /// The native clock is advancing.
    Playing,
    /// A swap or seek is in flight; native ticks are ignored until it lands.
    Seeking,
}

/// Result of mapping a timeline time onto a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMapping {
    pub segment_index: usize,
    pub clip_url: String,
    pub source_time: f64,
}

/// What a native tick did to the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The tick was not applicable (idle, seeking, or no matching segment).
    Ignored,
    /// Within epsilon of the published time; nothing written.
    Unchanged,
    /// A new timeline time was published.
    Published(f64),
    /// Crossed into the next segment.
    Advanced {
        from: usize,
        to: usize,
        swapped_source: bool,
    },
    /// Reached the end of the last segment and stopped.
    Ended,
    /// Moving to the next segment failed to load its source.
    Halted(PlaybackError),
}

#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    source_time: f64,
    resume: bool,
}

/// Map timeline time `t` to a source position.
///
/// Returns `None` outside `[0, duration)`, which callers treat as "nothing
/// to play" rather than an error.
pub fn timeline_to_source_time(segments: &[PlaybackSegment], t: f64) -> Option<SourceMapping> {
    if !t.is_finite() || t < 0.0 {
        return None;
    }
    // Segments are sorted and contiguous: first segment ending after `t`.
    let index = segments.partition_point(|s| s.timeline_end <= t);
    let segment = segments.get(index)?;
    if !segment.contains_timeline(t) {
        return None;
    }
    Some(SourceMapping {
        segment_index: index,
        clip_url: segment.source_url.clone(),
        source_time: segment.source_time_at(t),
    })
}

/// Keeps one media element in step with the timeline.
pub struct PlaybackController<M: MediaElement> {
    media: M,
    config: TimelineConfig,
    segments: Vec<PlaybackSegment>,
    state: TimelineState,
    phase: PlaybackPhase,
    active: Option<usize>,
    pending: Option<PendingSeek>,
    error: Option<PlaybackError>,
}

impl<M: MediaElement> PlaybackController<M> {
    pub fn new(media: M, config: TimelineConfig) -> Self {
        let state = TimelineState::new(config.min_duration_secs);
        Self {
            media,
            config,
            segments: Vec::new(),
            state,
            phase: PlaybackPhase::Idle,
            active: None,
            pending: None,
            error: None,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn timeline(&self) -> &TimelineState {
        &self.state
    }

    pub fn segments(&self) -> &[PlaybackSegment] {
        &self.segments
    }

    pub fn active_segment(&self) -> Option<&PlaybackSegment> {
        self.active.and_then(|i| self.segments.get(i))
    }

    /// Last source failure, kept until the next successful `play`.
    pub fn error(&self) -> Option<&PlaybackError> {
        self.error.as_ref()
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// Playable span of the current segments.
    pub fn content_duration(&self) -> f64 {
        content_duration(&self.segments)
    }

    /// Rebuild segments after any change to the video clip sequence.
    ///
    /// Runs synchronously so no caller can observe a stale segment list.
    pub fn set_clips(&mut self, clips: &[Clip]) {
        self.set_segments(build_playback_segments(clips));
    }

    pub fn set_segments(&mut self, segments: Vec<PlaybackSegment>) {
        let resume = self.wants_to_play();
        self.segments = segments;
        self.state
            .set_duration(content_duration(&self.segments), self.config.min_duration_secs);
        self.active = None;
        self.pending = None;

        tracing::debug!(
            segments = self.segments.len(),
            duration = self.state.duration(),
            "Playback segments rebuilt"
        );

        if self.segments.is_empty() {
            self.media.pause();
            self.phase = PlaybackPhase::Idle;
            self.state.set_playing(false);
            return;
        }

        self.phase = PlaybackPhase::Positioned;
        let t = self.state.current_time();
        self.sync_to(t, resume);
    }

    /// Start or resume playback from the current timeline position.
    ///
    /// Playing from the end of the content restarts from zero.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.segments.is_empty() {
            return Err(PlaybackError::NothingToPlay);
        }
        self.error = None;

        match self.phase {
            PlaybackPhase::Playing => return Ok(()),
            PlaybackPhase::Seeking => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.resume = true;
                }
                self.state.set_playing(true);
                return Ok(());
            }
            PlaybackPhase::Idle | PlaybackPhase::Positioned => {}
        }

        let mut t = self.state.current_time();
        if t >= self.content_duration() {
            t = self.state.set_current_time(0.0);
        }

        self.state.set_playing(true);
        self.sync_to(t, true);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Pause immediately, freezing the timeline where it is.
    pub fn pause(&mut self) {
        self.media.pause();
        self.state.set_playing(false);
        match self.phase {
            PlaybackPhase::Seeking => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.resume = false;
                }
            }
            PlaybackPhase::Playing => self.phase = PlaybackPhase::Positioned,
            PlaybackPhase::Idle | PlaybackPhase::Positioned => {}
        }
    }

    pub fn toggle(&mut self) -> Result<(), PlaybackError> {
        if self.wants_to_play() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Move the timeline from outside the controller (scrubber, shortcuts).
    pub fn seek(&mut self, t: f64) {
        let t = self.state.set_current_time(t);
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        let resume = self.wants_to_play();
        self.sync_to(t, resume);
    }

    /// Native playback tick carrying the media element's clock.
    pub fn on_source_time_update(&mut self, source_time: f64) -> SyncOutcome {
        if !matches!(self.phase, PlaybackPhase::Playing | PlaybackPhase::Positioned) {
            return SyncOutcome::Ignored;
        }
        let Some(index) = self.locate_loaded_segment(source_time) else {
            tracing::debug!(source_time, "Tick does not match any loaded segment");
            return SyncOutcome::Ignored;
        };
        self.active = Some(index);

        let segment = &self.segments[index];
        let timeline_time = segment.timeline_time_at(source_time);
        let at_segment_end = (source_time - segment.source_end).abs() < self.config.sync_epsilon_secs
            || source_time >= segment.source_end;

        let drift = ClockDrift::new(self.state.current_time(), timeline_time);
        let mut outcome = SyncOutcome::Unchanged;
        if drift.exceeds(self.config.sync_epsilon_secs) {
            let published = self.state.set_current_time(timeline_time);
            outcome = SyncOutcome::Published(published);
        }

        if self.phase == PlaybackPhase::Playing && at_segment_end {
            return self.advance_from(index);
        }
        outcome
    }

    /// The host finished the in-flight load/seek.
    pub fn on_seek_complete(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        tracing::debug!(source_time = pending.source_time, resume = pending.resume, "Seek completed");

        if pending.resume {
            match self.media.play() {
                Ok(()) => {
                    self.phase = PlaybackPhase::Playing;
                    self.state.set_playing(true);
                }
                Err(e) => {
                    let url = self.media.current_source().unwrap_or_default().to_string();
                    self.halt(url, e.message);
                }
            }
        } else {
            self.phase = PlaybackPhase::Positioned;
            self.state.set_playing(false);
        }
    }

    /// The host reports that `url` failed to load or decode.
    ///
    /// Playback halts on the failing segment; it never skips ahead on its own.
    pub fn on_source_error(&mut self, url: &str, message: impl Into<String>) {
        let affects_active = self
            .active_segment()
            .map(|s| s.source_url == url)
            .unwrap_or(false)
            || self.media.current_source() == Some(url);
        if !affects_active {
            tracing::debug!(url, "Ignoring error for a source that is not loaded");
            return;
        }
        self.halt(url.to_string(), message.into());
    }

    /// Overlays visible at the current playhead.
    pub fn visible_overlays<'a>(&self, overlays: &'a [TextOverlay]) -> Vec<&'a TextOverlay> {
        visible_overlays(overlays, self.state.current_time())
    }

    /// Audio clips sounding at the current playhead.
    pub fn active_audio_clips<'a>(&self, audio: &'a [AudioClip]) -> Vec<&'a AudioClip> {
        let t = self.state.current_time();
        audio.iter().filter(|a| a.is_active_at(t)).collect()
    }

    fn wants_to_play(&self) -> bool {
        match self.phase {
            PlaybackPhase::Playing => true,
            PlaybackPhase::Seeking => self.pending.map(|p| p.resume).unwrap_or(false),
            PlaybackPhase::Idle | PlaybackPhase::Positioned => false,
        }
    }

    /// Find the segment the media element is currently inside.
    ///
    /// The same source can back several segments (split clips), so the
    /// active segment wins when it matches. A tick at or past the active
    /// segment's out-point still belongs to it, however far it overshoots.
    fn locate_loaded_segment(&self, source_time: f64) -> Option<usize> {
        let url = self.media.current_source()?;
        let eps = self.config.sync_epsilon_secs;

        if let Some(index) = self.active {
            let overshot = self.segments.get(index).is_some_and(|s| {
                s.source_url == url
                    && source_time >= s.source_start - eps
                    && source_time >= s.source_end - eps
            });
            if overshot {
                return Some(index);
            }
        }
        let matches = |s: &PlaybackSegment| {
            s.source_url == url
                && source_time >= s.source_start - eps
                && source_time <= s.source_end + eps
        };

        if let Some(index) = self.active {
            if self.segments.get(index).is_some_and(|s| matches(s)) {
                return Some(index);
            }
        }
        self.segments.iter().position(|s| matches(s))
    }

    /// Point the media element at timeline time `t`.
    fn sync_to(&mut self, t: f64, resume: bool) {
        let Some(mapping) = timeline_to_source_time(&self.segments, t) else {
            // Past the content end: nothing to show, stop here.
            self.media.pause();
            self.phase = PlaybackPhase::Positioned;
            self.state.set_playing(false);
            self.active = None;
            self.pending = None;
            return;
        };

        self.active = Some(mapping.segment_index);
        let loaded = self.media.current_source() == Some(mapping.clip_url.as_str());

        if !loaded {
            tracing::info!(
                url = %mapping.clip_url,
                source_time = mapping.source_time,
                "Swapping media source"
            );
            self.begin_swap(mapping.clip_url, mapping.source_time, resume);
            return;
        }

        let drift = ClockDrift::new(mapping.source_time, self.media.position());
        let exceeds = drift.exceeds(self.config.sync_epsilon_secs);
        if exceeds {
            tracing::debug!(
                source_time = mapping.source_time,
                drift_secs = drift.drift_secs(),
                "Seeking media in place"
            );
            self.media.seek(mapping.source_time);
        }
        // An in-flight load or seek must land before the phase can leave Seeking.
        if exceeds || self.pending.is_some() {
            self.pending = Some(PendingSeek {
                source_time: mapping.source_time,
                resume,
            });
            self.phase = PlaybackPhase::Seeking;
            return;
        }

        if resume {
            if self.phase != PlaybackPhase::Playing {
                if let Err(e) = self.media.play() {
                    self.halt(mapping.clip_url, e.message);
                    return;
                }
            }
            self.phase = PlaybackPhase::Playing;
            self.state.set_playing(true);
        } else {
            self.media.pause();
            self.phase = PlaybackPhase::Positioned;
            self.state.set_playing(false);
        }
    }

    /// Load `url` and seek it as one step; ticks are ignored until it lands.
    fn begin_swap(&mut self, url: String, source_time: f64, resume: bool) {
        if let Err(e) = self.media.load(&url) {
            self.halt(url, e.message);
            return;
        }
        self.media.seek(source_time);
        self.pending = Some(PendingSeek {
            source_time,
            resume,
        });
        self.phase = PlaybackPhase::Seeking;
    }

    fn advance_from(&mut self, index: usize) -> SyncOutcome {
        let next_index = index + 1;
        let Some(next) = self.segments.get(next_index) else {
            self.media.pause();
            self.phase = PlaybackPhase::Positioned;
            self.state.set_playing(false);
            let end = self.content_duration();
            self.state.set_current_time(end);
            tracing::info!(end, "Reached end of timeline");
            return SyncOutcome::Ended;
        };

        let url = next.source_url.clone();
        let source_start = next.source_start;
        let timeline_start = next.timeline_start;
        let swapped_source = self.media.current_source() != Some(url.as_str());

        tracing::debug!(from = index, to = next_index, swapped_source, "Crossing segment boundary");

        self.active = Some(next_index);
        self.state.set_current_time(timeline_start);
        if swapped_source {
            self.begin_swap(url, source_start, true);
        } else {
            self.media.seek(source_start);
            self.pending = Some(PendingSeek {
                source_time: source_start,
                resume: true,
            });
            self.phase = PlaybackPhase::Seeking;
        }

        match &self.error {
            Some(err) if self.phase != PlaybackPhase::Seeking => SyncOutcome::Halted(err.clone()),
            _ => SyncOutcome::Advanced {
                from: index,
                to: next_index,
                swapped_source,
            },
        }
    }

    fn halt(&mut self, url: String, message: String) {
        tracing::warn!(url = %url, error = %message, "Media source failed; halting playback");
        self.media.pause();
        self.pending = None;
        self.phase = PlaybackPhase::Positioned;
        self.state.set_playing(false);
        self.error = Some(PlaybackError::SourceLoad { url, message });
    }
}
