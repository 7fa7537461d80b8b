//! Show project information.

use std::path::PathBuf;

use clipdeck_common::config::AppConfig;
use clipdeck_project_model::settings::QualityPreset;
use clipdeck_project_model::ProjectSnapshot;
use clipdeck_render_engine::estimate_size_bytes;
use clipdeck_timeline::{
    build_playback_segments, calculate_timeline_duration, content_duration, format_timecode,
    timeline_width,
};

pub fn run(path: PathBuf, config: &AppConfig) -> anyhow::Result<()> {
    let snapshot =
        ProjectSnapshot::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    println!("Project: {}", snapshot.project_name);
    if let Some(saved_at) = &snapshot.saved_at {
        println!("  Saved: {saved_at}");
    }
    println!();

    let segments = build_playback_segments(&snapshot.video_clips);
    let content = content_duration(&segments);
    let timeline = calculate_timeline_duration(
        &snapshot.video_clips,
        config.timeline.min_duration_secs,
    );

    println!("Timeline:");
    println!("  Content: {} ({content:.2}s)", format_timecode(content));
    println!("  Timeline length: {}", format_timecode(timeline));
    println!(
        "  Width at 1x: {:.0}px",
        timeline_width(timeline, 1.0, &config.timeline)
    );
    println!(
        "  Video clips: {} ({} playable)",
        snapshot.video_clips.len(),
        segments.len()
    );
    println!("  Audio clips: {}", snapshot.audio_clips.len());
    println!("  Text overlays: {}", snapshot.text_overlays.len());
    println!();

    println!("Estimated export size:");
    for preset in QualityPreset::ALL {
        let spec = preset.spec();
        let bytes = estimate_size_bytes(&snapshot.video_clips, preset);
        println!(
            "  {:<6} {}x{} @ {}  ~{:.1} MB",
            preset.as_str(),
            spec.width,
            spec.height,
            spec.bitrate_arg(),
            bytes as f64 / 1_000_000.0
        );
    }

    Ok(())
}
