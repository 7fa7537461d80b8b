//! End-to-end export through a real ffmpeg. Skipped when ffmpeg is absent.

use std::sync::{Arc, Mutex};

use clipdeck_project_model::clip::{Clip, ClipKind};
use clipdeck_project_model::settings::{ExportFormat, ExportSettings, QualityPreset};
use clipdeck_render_engine::ffmpeg::command_exists;
use clipdeck_render_engine::{ExportOrchestrator, FfmpegEngine, FfprobeProbe};
use clipdeck_timeline::import::MediaProbe;

async fn make_source(path: &std::path::Path, seconds: u32) -> bool {
    tokio::process::Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=size=320x240:rate=10:duration={seconds}"))
        .arg(path)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn gif_export_of_two_trimmed_clips() {
    clipdeck_common::logging::init_test_logging();
    if !command_exists("ffmpeg").await || !command_exists("ffprobe").await {
        eprintln!("ffmpeg not available; skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.mkv");
    if !make_source(&source, 3).await {
        eprintln!("could not synthesize a test source; skipping");
        return;
    }
    let url = source.to_string_lossy().into_owned();

    let duration = FfprobeProbe::new().probe_duration(&url).await.unwrap();
    assert!((duration - 3.0).abs() < 0.5);

    let clips = vec![
        Clip::new("a", url.clone(), 0.0, 1.0, ClipKind::Video).unwrap(),
        Clip::new("b", url, 2.0, 3.0, ClipKind::Video).unwrap(),
    ];
    let settings = ExportSettings {
        format: ExportFormat::Gif,
        quality: QualityPreset::Low,
        fps: 5,
        include_audio: false,
    };

    let orchestrator = ExportOrchestrator::new(Arc::new(FfmpegEngine::new()), dir.path().join("out"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let output = orchestrator
        .export_video(&clips, &[], &[], &settings, move |p| sink.lock().unwrap().push(p))
        .await
        .unwrap();

    assert!(output.size_bytes > 0);
    assert_eq!(output.format, ExportFormat::Gif);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last().copied(), Some(1.0));
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
}
