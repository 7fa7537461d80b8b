//! Turning dropped or picked media into clips.
//!
//! A clip with an unknown duration cannot be placed on the timeline, so
//! drops that arrive without a usable duration are probed first.

use async_trait::async_trait;

use clipdeck_common::error::{ClipdeckError, ClipdeckResult};
use clipdeck_project_model::clip::{Clip, ClipKind};

/// Something that can measure the real duration of a media URL.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe_duration(&self, url: &str) -> ClipdeckResult<f64>;
}

/// Payload delivered by drag-and-drop or the file picker.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedMedia {
    pub url: String,
    pub duration: Option<f64>,
}

fn usable(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

/// Create a full-length clip for `drop`, probing when the duration is missing.
pub async fn clip_from_drop(
    drop: &DroppedMedia,
    kind: ClipKind,
    probe: &dyn MediaProbe,
) -> ClipdeckResult<Clip> {
    let duration = match drop.duration.filter(|d| usable(*d)) {
        Some(d) => d,
        None => {
            tracing::debug!(url = %drop.url, declared = ?drop.duration, "Probing media duration");
            let probed = probe.probe_duration(&drop.url).await?;
            if !usable(probed) {
                return Err(ClipdeckError::media(format!(
                    "Probed duration {probed} for {} is not usable",
                    drop.url
                )));
            }
            probed
        }
    };

    Clip::from_source(drop.url.clone(), duration, kind)
        .map_err(|e| ClipdeckError::project(format!("Failed to create clip: {e}")))
}
