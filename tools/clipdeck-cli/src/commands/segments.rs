//! Print playback segments and resolve timeline times.

use std::path::PathBuf;

use clipdeck_project_model::ProjectSnapshot;
use clipdeck_timeline::{
    build_playback_segments, content_duration, format_timecode, timeline_to_source_time,
};

pub fn run(path: PathBuf, at: Option<f64>, json: bool) -> anyhow::Result<()> {
    let snapshot =
        ProjectSnapshot::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;
    let segments = build_playback_segments(&snapshot.video_clips);

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
    } else {
        println!("{:>3}  {:>10}  {:>10}  {:>9}  {:>9}  source", "#", "start", "end", "in", "out");
        for (i, seg) in segments.iter().enumerate() {
            println!(
                "{i:>3}  {:>10}  {:>10}  {:>9.3}  {:>9.3}  {}",
                format_timecode(seg.timeline_start),
                format_timecode(seg.timeline_end),
                seg.source_start,
                seg.source_end,
                seg.source_url
            );
        }
        println!(
            "\n{} segment(s), {:.3}s total",
            segments.len(),
            content_duration(&segments)
        );
    }

    if let Some(t) = at {
        match timeline_to_source_time(&segments, t) {
            Some(mapping) => println!(
                "t={t:.3}s -> segment {} at {:.3}s of {}",
                mapping.segment_index, mapping.source_time, mapping.clip_url
            ),
            None => println!("t={t:.3}s -> nothing to play"),
        }
    }

    Ok(())
}
