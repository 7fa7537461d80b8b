//! Text overlays.

use serde::{Deserialize, Serialize};

/// Text drawn over the video while the playhead is inside its interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    pub id: String,
    pub text: String,
    pub timeline_start: f64,
    pub timeline_end: f64,
    #[serde(default)]
    pub style: OverlayStyle,
}

/// Visual style of a text overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayStyle {
    /// Font size in output pixels at 1080p; scaled for other presets.
    pub font_size: u32,
    /// Hex color such as `#ffffff`.
    pub color: String,
    /// Horizontal anchor, normalized `[0.0, 1.0]`.
    pub x: f64,
    /// Vertical anchor, normalized `[0.0, 1.0]`.
    pub y: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 48,
            color: "#ffffff".to_string(),
            x: 0.5,
            y: 0.85,
        }
    }
}

impl TextOverlay {
    /// Inclusive at both ends.
    pub fn is_visible_at(&self, t: f64) -> bool {
        t >= self.timeline_start && t <= self.timeline_end
    }
}

/// Overlays visible at timeline time `t`, in their stored order.
pub fn visible_overlays(overlays: &[TextOverlay], t: f64) -> Vec<&TextOverlay> {
    overlays.iter().filter(|o| o.is_visible_at(t)).collect()
}
