//! Flattening the video track into playback segments.

use serde::Serialize;

use clipdeck_project_model::clip::Clip;

/// Placement of one clip's trimmed range on the timeline.
///
/// Always derived from the clip list and never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSegment {
    pub clip_id: String,
    pub source_url: String,
    pub source_start: f64,
    pub source_end: f64,
    pub timeline_start: f64,
    pub timeline_end: f64,
}

impl PlaybackSegment {
    pub fn duration(&self) -> f64 {
        self.timeline_end - self.timeline_start
    }

    /// Half-open containment `[timeline_start, timeline_end)`.
    pub fn contains_timeline(&self, t: f64) -> bool {
        t >= self.timeline_start && t < self.timeline_end
    }

    /// Source time corresponding to timeline time `t`.
    pub fn source_time_at(&self, t: f64) -> f64 {
        self.source_start + (t - self.timeline_start)
    }

    /// Timeline time corresponding to source time `s`, clamped to this segment.
    pub fn timeline_time_at(&self, s: f64) -> f64 {
        (self.timeline_start + (s - self.source_start)).clamp(self.timeline_start, self.timeline_end)
    }
}

/// Walk the clips in order, laying each trimmed range after the previous one.
///
/// Clips with no positive duration are skipped so consumers never meet a
/// zero-length segment they could get stuck on.
pub fn build_playback_segments(clips: &[Clip]) -> Vec<PlaybackSegment> {
    let mut cursor = 0.0;
    let mut segments = Vec::with_capacity(clips.len());

    for clip in clips {
        let duration = clip.source_out - clip.source_in;
        if !(duration.is_finite() && duration > 0.0) {
            tracing::warn!(
                clip_id = %clip.id,
                source_in = clip.source_in,
                source_out = clip.source_out,
                "Skipping clip with empty trim range"
            );
            continue;
        }

        segments.push(PlaybackSegment {
            clip_id: clip.id.clone(),
            source_url: clip.source_url.clone(),
            source_start: clip.source_in,
            source_end: clip.source_out,
            timeline_start: cursor,
            timeline_end: cursor + duration,
        });
        cursor += duration;
    }

    segments
}

/// Sum of trimmed clip durations, ignoring degenerate clips.
pub fn total_trimmed_duration(clips: &[Clip]) -> f64 {
    clips.iter().map(Clip::duration).sum()
}

/// Timeline duration for `clips`, never below `min_duration`.
pub fn calculate_timeline_duration(clips: &[Clip], min_duration: f64) -> f64 {
    total_trimmed_duration(clips).max(min_duration)
}

/// End of the last segment, i.e. the playable span without any floor.
pub fn content_duration(segments: &[PlaybackSegment]) -> f64 {
    segments.last().map(|s| s.timeline_end).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipdeck_project_model::clip::ClipKind;

    fn clip(id: &str, url: &str, source_in: f64, source_out: f64) -> Clip {
        Clip {
            id: id.to_string(),
            source_url: url.to_string(),
            source_in,
            source_out,
            kind: ClipKind::Video,
            volume: None,
        }
    }

    #[test]
    fn test_segments_accumulate_offsets() {
        let clips = vec![
            clip("a", "a.mp4", 2.0, 7.0),
            clip("b", "b.mp4", 0.0, 3.0),
            clip("c", "a.mp4", 10.0, 14.0),
        ];
        let segments = build_playback_segments(&clips);

        assert_eq!(segments.len(), 3);
        assert_eq!((segments[0].timeline_start, segments[0].timeline_end), (0.0, 5.0));
        assert_eq!((segments[1].timeline_start, segments[1].timeline_end), (5.0, 8.0));
        assert_eq!((segments[2].timeline_start, segments[2].timeline_end), (8.0, 12.0));
        assert_eq!(segments[2].source_start, 10.0);
        assert_eq!(content_duration(&segments), 12.0);
    }

    #[test]
    fn test_degenerate_clips_are_skipped() {
        let clips = vec![
            clip("a", "a.mp4", 0.0, 2.0),
            clip("empty", "e.mp4", 3.0, 3.0),
            clip("inverted", "i.mp4", 5.0, 1.0),
            clip("b", "b.mp4", 0.0, 1.0),
        ];
        let segments = build_playback_segments(&clips);
        let ids: Vec<_> = segments.iter().map(|s| s.clip_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(segments[1].timeline_start, 2.0);
    }

    #[test]
    fn test_duration_floor() {
        assert_eq!(calculate_timeline_duration(&[], 60.0), 60.0);
        let clips = vec![clip("a", "a.mp4", 0.0, 90.0)];
        assert_eq!(calculate_timeline_duration(&clips, 60.0), 90.0);
    }

    #[test]
    fn test_timeline_time_at_clamps_into_segment() {
        let segment = build_playback_segments(&[clip("a", "a.mp4", 2.0, 4.0)]).remove(0);
        assert_eq!(segment.timeline_time_at(3.0), 1.0);
        assert_eq!(segment.timeline_time_at(9.0), 2.0);
        assert_eq!(segment.timeline_time_at(0.0), 0.0);
    }
}
