//! ffmpeg-backed transcoding engine.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use clipdeck_common::error::{ClipdeckError, ClipdeckResult};
use clipdeck_project_model::clip::AudioClip;
use clipdeck_project_model::overlay::TextOverlay;
use clipdeck_project_model::project::local_path;
use clipdeck_project_model::settings::{ExportFormat, ExportSettings};
use clipdeck_timeline::segments::{build_playback_segments, PlaybackSegment};

use crate::engine::{CancelHandle, EngineProgress, ExportRequest, TranscodeEngine};

const STALL_WARN_SECS: u64 = 10;
const STDERR_TAIL_LINES: usize = 20;

/// Transcoding engine that shells out to the `ffmpeg` binary.
pub struct FfmpegEngine {
    binary: String,
    initialized: AtomicBool,
    active: Mutex<Vec<CancelHandle>>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            initialized: AtomicBool::new(false),
            active: Mutex::new(Vec::new()),
        }
    }

    fn active(&self) -> MutexGuard<'_, Vec<CancelHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_ffmpeg(
        &self,
        plan: &ExportPlan,
        progress: EngineProgress,
        cancel: &CancelHandle,
    ) -> ClipdeckResult<()> {
        tracing::debug!(args = ?plan.args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClipdeckError::render(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            inputs = plan.input_count,
            expected_duration_secs = plan.expected_duration_secs,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClipdeckError::render("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClipdeckError::render("Failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks on a full stderr pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let started = Instant::now();
        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();

        progress(0.0);
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stderr_task.abort();
                    return Err(kill_cancelled(&mut child).await);
                }
                line = lines.next_line() => line
                    .map_err(|e| ClipdeckError::render(format!("Failed reading ffmpeg progress: {e}")))?,
            };
            let Some(line) = line else { break };

            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key != "progress" {
                continue;
            }

            if state.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = state.out_time_secs;
                last_progress_wall = Instant::now();
            } else if last_progress_wall.elapsed().as_secs() >= STALL_WARN_SECS {
                tracing::warn!(
                    out_time_secs = state.out_time_secs,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for 10s"
                );
                last_progress_wall = Instant::now();
            }
            progress(progress_percent(&state, plan.expected_duration_secs));
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stderr_task.abort();
                return Err(kill_cancelled(&mut child).await);
            }
            status = child.wait() => status
                .map_err(|e| ClipdeckError::render(format!("Failed to wait on ffmpeg: {e}")))?,
        };

        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ClipdeckError::render(format!(
                "ffmpeg export failed (status {status}): {}",
                stderr_tail(&stderr_output)
            )));
        }

        progress(100.0);
        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "ffmpeg finished"
        );
        Ok(())
    }
}

async fn kill_cancelled(child: &mut Child) -> ClipdeckError {
    tracing::warn!(pid = child.id(), "Export cancelled; killing ffmpeg");
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill ffmpeg");
    }
    ClipdeckError::cancelled("Export cancelled")
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn initialize(&self) -> ClipdeckResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if !command_exists(&self.binary).await {
            return Err(ClipdeckError::unsupported(format!(
                "No transcoding engine found (expected {} in PATH)",
                self.binary
            )));
        }
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(binary = %self.binary, "Transcoding engine initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn export(
        &self,
        request: &ExportRequest,
        progress: EngineProgress,
        cancel: CancelHandle,
    ) -> ClipdeckResult<std::path::PathBuf> {
        if !self.is_initialized() {
            return Err(ClipdeckError::render("Transcoding engine is not initialized"));
        }

        let plan = build_plan(request)?;
        self.active().push(cancel.clone());
        let result = self.run_ffmpeg(&plan, progress, &cancel).await;
        self.active().retain(|handle| !handle.same_as(&cancel));

        result.map(|_| request.output_path.clone())
    }

    fn terminate(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        let active: Vec<CancelHandle> = self.active().drain(..).collect();
        for handle in &active {
            handle.cancel();
        }
        tracing::info!(cancelled = active.len(), "Transcoding engine terminated");
    }
}

/// Argument list plus bookkeeping for one ffmpeg run.
#[derive(Debug, Clone)]
pub(crate) struct ExportPlan {
    pub(crate) args: Vec<String>,
    pub(crate) input_count: usize,
    pub(crate) expected_duration_secs: f64,
}

pub(crate) fn build_plan(request: &ExportRequest) -> ClipdeckResult<ExportPlan> {
    let segments = build_playback_segments(&request.clips);
    if segments.is_empty() {
        return Err(ClipdeckError::render(
            "Nothing to export: no clip has a positive trimmed duration",
        ));
    }
    let duration = segments.iter().map(PlaybackSegment::duration).sum::<f64>();
    let settings = &request.settings;

    let audio: Vec<&AudioClip> = if settings.wants_audio() {
        request
            .audio_clips
            .iter()
            .filter(|a| a.clip.is_valid() && a.timeline_start < duration)
            .collect()
    } else {
        Vec::new()
    };

    let mut args: Vec<String> = ["-y", "-hide_banner", "-nostats", "-progress", "pipe:1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for segment in &segments {
        push_trimmed_input(
            &mut args,
            segment.source_start,
            segment.source_end,
            &segment.source_url,
        );
    }
    for clip in &audio {
        push_trimmed_input(
            &mut args,
            clip.clip.source_in,
            clip.clip.source_out,
            &clip.clip.source_url,
        );
    }

    let graph = build_filter_graph(&segments, &audio, &request.overlays, settings);
    args.push("-filter_complex".to_string());
    args.push(graph);
    args.push("-map".to_string());
    args.push("[vout]".to_string());
    if audio.is_empty() {
        args.push("-an".to_string());
    } else {
        args.push("-map".to_string());
        args.push("[aout]".to_string());
    }

    args.extend(codec_args_for_settings(settings, !audio.is_empty()));
    args.push("-r".to_string());
    args.push(settings.fps.max(1).to_string());
    args.push("-t".to_string());
    args.push(secs(duration));
    args.push(request.output_path.to_string_lossy().into_owned());

    tracing::debug!(
        segments = segments.len(),
        audio_inputs = audio.len(),
        overlays = request.overlays.len(),
        duration_secs = duration,
        "Export plan built"
    );

    Ok(ExportPlan {
        args,
        input_count: segments.len() + audio.len(),
        expected_duration_secs: duration,
    })
}

fn push_trimmed_input(args: &mut Vec<String>, start: f64, end: f64, url: &str) {
    args.push("-ss".to_string());
    args.push(secs(start));
    args.push("-to".to_string());
    args.push(secs(end));
    args.push("-i".to_string());
    args.push(input_locator(url));
}

fn input_locator(url: &str) -> String {
    local_path(url)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string())
}

fn secs(value: f64) -> String {
    format!("{value:.3}")
}

fn build_filter_graph(
    segments: &[PlaybackSegment],
    audio: &[&AudioClip],
    overlays: &[TextOverlay],
    settings: &ExportSettings,
) -> String {
    let spec = settings.spec();
    let fps = settings.fps.max(1);
    let mut parts = Vec::new();

    for i in 0..segments.len() {
        parts.push(format!(
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p,setpts=PTS-STARTPTS[v{i}]",
            w = spec.width,
            h = spec.height,
        ));
    }
    let labels: String = (0..segments.len()).map(|i| format!("[v{i}]")).collect();
    parts.push(format!("{labels}concat=n={}:v=1:a=0[vcat]", segments.len()));

    let mut current = "vcat";
    let drawtext: Vec<String> = overlays
        .iter()
        .filter(|o| !o.text.trim().is_empty() && o.timeline_end > o.timeline_start)
        .map(|o| drawtext_filter(o, spec.height))
        .collect();
    if !drawtext.is_empty() {
        parts.push(format!("[vcat]{}[vtxt]", drawtext.join(",")));
        current = "vtxt";
    }

    if settings.format == ExportFormat::Gif {
        parts.push(format!(
            "[{current}]split[g0][g1];[g0]palettegen[pal];[g1][pal]paletteuse[vout]"
        ));
    } else {
        parts.push(format!("[{current}]null[vout]"));
    }

    if !audio.is_empty() {
        let base = segments.len();
        for (k, clip) in audio.iter().enumerate() {
            let delay_ms = (clip.timeline_start.max(0.0) * 1000.0).round() as u64;
            parts.push(format!(
                "[{input}:a]asetpts=PTS-STARTPTS,adelay={delay_ms}:all=1,volume={gain:.3}[a{k}]",
                input = base + k,
                gain = clip.clip.gain(),
            ));
        }
        let labels: String = (0..audio.len()).map(|k| format!("[a{k}]")).collect();
        parts.push(format!(
            "{labels}amix=inputs={}:duration=longest:normalize=0[aout]",
            audio.len()
        ));
    }

    parts.join(";")
}

fn drawtext_filter(overlay: &TextOverlay, output_height: u32) -> String {
    let style = &overlay.style;
    let font_size = ((style.font_size as f64) * output_height as f64 / 1080.0)
        .round()
        .max(1.0) as u32;
    format!(
        "drawtext=text='{text}':fontsize={font_size}:fontcolor={color}:x=(w-text_w)*{x:.3}:y=(h-text_h)*{y:.3}:enable='between(t,{start},{end})'",
        text = escape_drawtext(&overlay.text),
        color = style.color,
        x = style.x.clamp(0.0, 1.0),
        y = style.y.clamp(0.0, 1.0),
        start = secs(overlay.timeline_start.max(0.0)),
        end = secs(overlay.timeline_end),
    )
}

/// Best-effort escaping for text inside a quoted drawtext argument.
fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            '\'' => out.push('\u{2019}'),
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn codec_args_for_settings(settings: &ExportSettings, has_audio: bool) -> Vec<String> {
    let video_bitrate = settings.spec().bitrate_arg();

    let mut args: Vec<String> = match settings.format {
        ExportFormat::Mp4 => vec![
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-profile:v".into(),
            "high".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-b:v".into(),
            video_bitrate,
            "-movflags".into(),
            "+faststart".into(),
        ],
        ExportFormat::Webm => vec![
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-b:v".into(),
            video_bitrate,
        ],
        ExportFormat::Gif => vec!["-loop".into(), "0".into()],
    };

    if has_audio {
        match settings.format {
            ExportFormat::Mp4 => args.extend(["-c:a", "aac", "-b:a", "128k"].map(String::from)),
            ExportFormat::Webm => {
                args.extend(["-c:a", "libopus", "-b:a", "128k"].map(String::from))
            }
            ExportFormat::Gif => {}
        }
    }

    args
}

/// Whether `binary` resolves on the current `PATH`.
pub async fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

fn stderr_tail(output: &str) -> String {
    let lines: Vec<&str> = output.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports out_time_ms in microseconds as well.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_percent(state: &ProgressState, expected_duration_secs: f64) -> f64 {
    if state.complete {
        return 100.0;
    }
    if expected_duration_secs <= 0.0 {
        return 0.0;
    }
    (state.out_time_secs / expected_duration_secs * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipdeck_project_model::clip::{Clip, ClipKind};
    use clipdeck_project_model::overlay::OverlayStyle;
    use clipdeck_project_model::settings::QualityPreset;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn video(id: &str, url: &str, source_in: f64, source_out: f64) -> Clip {
        Clip::new(id, url, source_in, source_out, ClipKind::Video).unwrap()
    }

    fn request(settings: ExportSettings) -> ExportRequest {
        ExportRequest {
            clips: vec![
                video("a", "file:///media/a.mp4", 1.0, 6.0),
                video("b", "/media/b.mp4", 0.0, 3.0),
            ],
            audio_clips: vec![AudioClip::new(
                Clip::new("m", "/media/music.mp3", 0.0, 20.0, ClipKind::Audio)
                    .unwrap()
                    .with_volume(0.5),
                2.0,
            )
            .unwrap()],
            overlays: vec![TextOverlay {
                id: "t1".into(),
                text: "Hello: 100%".into(),
                timeline_start: 1.0,
                timeline_end: 3.0,
                style: OverlayStyle::default(),
            }],
            settings,
            output_path: PathBuf::from("/tmp/out.mp4"),
        }
    }

    fn window(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_progress_state_parses_microseconds() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "2500000");
        assert!((state.out_time_secs - 2.5).abs() < 1e-9);
        state.update("out_time_ms", "5000000");
        assert!((state.out_time_secs - 5.0).abs() < 1e-9);
        assert!((progress_percent(&state, 10.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_end_reports_full() {
        let mut state = ProgressState::default();
        state.update("progress", "end");
        assert_eq!(progress_percent(&state, 10.0), 100.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "99000000");
        assert_eq!(progress_percent(&state, 10.0), 100.0);
        assert_eq!(progress_percent(&ProgressState::default(), 0.0), 0.0);
    }

    #[test]
    fn test_plan_trims_each_clip_in_timeline_order() {
        let plan = build_plan(&request(ExportSettings::default())).unwrap();
        let args = &plan.args;

        let first = args.iter().position(|a| a == "/media/a.mp4").unwrap();
        let second = args.iter().position(|a| a == "/media/b.mp4").unwrap();
        assert!(first < second);
        assert_eq!(&args[first - 5..first], &["-ss", "1.000", "-to", "6.000", "-i"]);
        assert!(window(args, "-t", "8.000"));
        assert_eq!(plan.input_count, 3);
        assert!((plan.expected_duration_secs - 8.0).abs() < 1e-9);
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_plan_resamples_to_preset_dimensions() {
        let settings = ExportSettings {
            quality: QualityPreset::High,
            fps: 24,
            ..ExportSettings::default()
        };
        let plan = build_plan(&request(settings)).unwrap();
        let graph = &plan.args[plan.args.iter().position(|a| a == "-filter_complex").unwrap() + 1];

        assert!(graph.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(graph.contains("pad=1920:1080"));
        assert!(graph.contains("fps=24"));
        assert!(graph.contains("concat=n=2:v=1:a=0[vcat]"));
        assert!(window(&plan.args, "-b:v", "5000k"));
        assert!(window(&plan.args, "-r", "24"));
    }

    #[test]
    fn test_plan_mixes_delayed_audio() {
        let plan = build_plan(&request(ExportSettings::default())).unwrap();
        let graph = &plan.args[plan.args.iter().position(|a| a == "-filter_complex").unwrap() + 1];

        assert!(graph.contains("[2:a]asetpts=PTS-STARTPTS,adelay=2000:all=1,volume=0.500[a0]"));
        assert!(graph.contains("[a0]amix=inputs=1"));
        assert!(window(&plan.args, "-map", "[aout]"));
        assert!(window(&plan.args, "-c:a", "aac"));
        assert!(!plan.args.iter().any(|a| a == "-an"));
    }

    #[test]
    fn test_plan_without_audio_drops_audio_track() {
        let settings = ExportSettings {
            include_audio: false,
            ..ExportSettings::default()
        };
        let plan = build_plan(&request(settings)).unwrap();
        assert!(plan.args.iter().any(|a| a == "-an"));
        assert!(!plan.args.iter().any(|a| a == "[aout]"));
        assert!(!plan.args.iter().any(|a| a == "/media/music.mp3"));
    }

    #[test]
    fn test_gif_uses_palette_and_no_audio() {
        let settings = ExportSettings {
            format: ExportFormat::Gif,
            ..ExportSettings::default()
        };
        let plan = build_plan(&request(settings)).unwrap();
        let graph = &plan.args[plan.args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("palettegen"));
        assert!(graph.ends_with("paletteuse[vout]"));
        assert!(plan.args.iter().any(|a| a == "-an"));
        assert!(window(&plan.args, "-loop", "0"));
    }

    #[test]
    fn test_overlays_become_timed_drawtext() {
        let plan = build_plan(&request(ExportSettings::default())).unwrap();
        let graph = &plan.args[plan.args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("[vcat]drawtext=text='Hello\\: 100\\%'"));
        assert!(graph.contains("enable='between(t,1.000,3.000)'"));
        // 48px at 1080p scales to 32px at 720p.
        assert!(graph.contains("fontsize=32"));
        assert!(graph.contains("[vtxt]null[vout]"));
    }

    #[test]
    fn test_degenerate_clips_are_skipped() {
        let mut req = request(ExportSettings::default());
        req.clips[1].source_out = req.clips[1].source_in;
        let plan = build_plan(&req).unwrap();
        assert!(!plan.args.iter().any(|a| a == "/media/b.mp4"));
        assert!((plan.expected_duration_secs - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_timeline_is_rejected() {
        let mut req = request(ExportSettings::default());
        req.clips.clear();
        assert!(build_plan(&req).is_err());
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
        assert_eq!(escape_drawtext("it's"), "it\u{2019}s");
        assert_eq!(escape_drawtext("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let output: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&output);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn test_export_requires_initialization() {
        let engine = FfmpegEngine::new();
        let progress: EngineProgress = Arc::new(|_| {});
        let err = engine
            .export(&request(ExportSettings::default()), progress, CancelHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClipdeckError::Render { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_initialization() {
        let engine = FfmpegEngine::with_binary("clipdeck-no-such-ffmpeg");
        assert!(engine.initialize().await.is_err());
        assert!(!engine.is_initialized());
    }
}
