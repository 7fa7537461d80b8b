//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clipdeck_common::config::AppConfig;
use clipdeck_project_model::settings::{ExportFormat, ExportSettings, QualityPreset};
use clipdeck_project_model::ProjectSnapshot;
use clipdeck_render_engine::{estimate_size_bytes, ExportOrchestrator, FfmpegEngine};

pub struct ExportArgs {
    pub quality: Option<String>,
    pub format: Option<String>,
    pub fps: Option<u32>,
    pub include_audio: bool,
    pub output_dir: Option<PathBuf>,
}

pub async fn run(path: PathBuf, args: ExportArgs, config: &AppConfig) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let snapshot =
        ProjectSnapshot::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let quality: QualityPreset = args
        .quality
        .as_deref()
        .unwrap_or(&config.export.quality)
        .parse()?;
    let format: ExportFormat = args
        .format
        .as_deref()
        .unwrap_or(&config.export.format)
        .parse()?;
    let settings = ExportSettings {
        format,
        quality,
        fps: args.fps.unwrap_or(config.export.fps),
        include_audio: args.include_audio,
    };
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.export.output_dir.clone());

    for unresolved in snapshot.validate_sources() {
        println!(
            "  Warning: clip {} source not found: {}",
            unresolved.clip_id, unresolved.source_url
        );
    }

    let spec = settings.spec();
    println!("  Output dir: {}", output_dir.display());
    println!("  Format: {}", format.extension());
    println!(
        "  Quality: {} ({}x{} @ {}, {}fps)",
        quality,
        spec.width,
        spec.height,
        spec.bitrate_arg(),
        settings.fps
    );
    println!(
        "  Estimated size: ~{:.1} MB",
        estimate_size_bytes(&snapshot.video_clips, quality) as f64 / 1_000_000.0
    );

    let orchestrator = ExportOrchestrator::new(Arc::new(FfmpegEngine::new()), output_dir);
    let export = orchestrator.export_video(
        &snapshot.video_clips,
        &snapshot.audio_clips,
        &snapshot.text_overlays,
        &settings,
        |p| {
            print!("\r  Progress: {:.1}%  ", p * 100.0);
            let _ = std::io::stdout().flush();
        },
    );
    tokio::pin!(export);

    let result = tokio::select! {
        result = &mut export => result,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.terminate();
            export.await
        }
    };

    match result {
        Ok(output) => {
            println!(
                "\nExport complete: {} ({:.1} MB)",
                output.path.display(),
                output.size_bytes as f64 / 1_000_000.0
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("\nExport cancelled.");
            Ok(())
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            Err(e.into())
        }
    }
}
