//! Conversions between ruler pixels and timeline seconds.
//!
//! No rounding happens here; snapping to whole pixels is the renderer's job.

use clipdeck_common::config::TimelineConfig;

/// Ruler width in pixels for a timeline of `duration` seconds at `scale`.
pub fn timeline_width(duration: f64, scale: f64, config: &TimelineConfig) -> f64 {
    let width = duration * scale * config.pixels_per_second;
    if width.is_finite() {
        width.max(config.min_width_px)
    } else {
        config.min_width_px
    }
}

/// Timeline seconds at horizontal pixel offset `px`.
///
/// A non-positive scale has no meaningful mapping and yields `0.0`.
pub fn pixel_to_time(px: f64, scale: f64, config: &TimelineConfig) -> f64 {
    let pps = config.pixels_per_second * scale;
    if pps > 0.0 {
        px / pps
    } else {
        0.0
    }
}

/// Horizontal pixel offset of timeline time `t`. Inverse of [`pixel_to_time`].
pub fn time_to_pixel(t: f64, scale: f64, config: &TimelineConfig) -> f64 {
    let pps = config.pixels_per_second * scale;
    if pps > 0.0 {
        t * pps
    } else {
        0.0
    }
}

/// Ruler label such as `01:05.3`.
pub fn format_timecode(secs: f64) -> String {
    let tenths = (secs.max(0.0) * 10.0).round() as u64;
    let minutes = tenths / 600;
    let seconds = (tenths / 10) % 60;
    format!("{minutes:02}:{seconds:02}.{}", tenths % 10)
}
