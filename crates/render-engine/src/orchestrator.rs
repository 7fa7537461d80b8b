//! Export job orchestration.
//!
//! One orchestrator owns one engine. Each `export_video` call becomes an
//! [`ExportJob`] with a fresh id; progress from any job other than the
//! current one is dropped, so callbacks that race a `terminate()` never
//! reach the caller.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use clipdeck_common::error::{ClipdeckError, ClipdeckResult};
use clipdeck_project_model::clip::{AudioClip, Clip};
use clipdeck_project_model::overlay::TextOverlay;
use clipdeck_project_model::settings::{ExportFormat, ExportSettings, QualityPreset};
use clipdeck_timeline::segments::total_trimmed_duration;

use crate::engine::{CancelHandle, EngineProgress, ExportRequest, TranscodeEngine};

/// A finished export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: ExportFormat,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(ExportOutput),
    Failed(String),
    Cancelled,
}

/// Snapshot of the most recent export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub id: u64,
    /// Fraction in `[0, 1]`.
    pub progress: f64,
    /// `None` while running.
    pub result: Option<JobOutcome>,
}

impl ExportJob {
    fn new(id: u64) -> Self {
        Self {
            id,
            progress: 0.0,
            result: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.result.is_none()
    }
}

/// Rough output size for display: trimmed duration times bitrate, in bytes.
pub fn estimate_size_bytes(clips: &[Clip], quality: QualityPreset) -> u64 {
    let seconds = total_trimmed_duration(clips);
    (seconds * quality.spec().bitrate_bps() * 0.125).round() as u64
}

/// Drives a [`TranscodeEngine`] through export jobs.
pub struct ExportOrchestrator {
    engine: Arc<dyn TranscodeEngine>,
    output_dir: PathBuf,
    next_id: AtomicU64,
    /// Id of the job whose progress is still wanted; 0 when none.
    current_id: Arc<AtomicU64>,
    job: Arc<Mutex<Option<ExportJob>>>,
    cancel: Mutex<Option<(u64, CancelHandle)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ExportOrchestrator {
    pub fn new(engine: Arc<dyn TranscodeEngine>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            next_id: AtomicU64::new(0),
            current_id: Arc::new(AtomicU64::new(0)),
            job: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(None),
        }
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// Snapshot of the latest job, running or finished.
    pub fn current_job(&self) -> Option<ExportJob> {
        lock(&self.job).clone()
    }

    /// Boot the engine if it is not already running.
    pub async fn initialize(&self) -> ClipdeckResult<()> {
        if self.engine.is_initialized() {
            return Ok(());
        }
        tracing::info!(engine = self.engine.name(), "Initializing transcoding engine");
        self.engine.initialize().await
    }

    /// Render the clip sequence into one file matching `settings.format`.
    ///
    /// `on_progress` receives fractions in `[0, 1]`. Failures are terminal
    /// for the job; nothing is retried.
    pub async fn export_video<F>(
        &self,
        clips: &[Clip],
        audio_clips: &[AudioClip],
        overlays: &[TextOverlay],
        settings: &ExportSettings,
        on_progress: F,
    ) -> ClipdeckResult<ExportOutput>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.current_id.store(id, Ordering::SeqCst);
        *lock(&self.job) = Some(ExportJob::new(id));

        tracing::info!(
            job_id = id,
            clips = clips.len(),
            audio_clips = audio_clips.len(),
            overlays = overlays.len(),
            format = ?settings.format,
            quality = %settings.quality,
            "Starting export"
        );

        let result = self
            .run_job(id, clips, audio_clips, overlays, settings, on_progress)
            .await;

        {
            let mut cancel = lock(&self.cancel);
            if matches!(cancel.as_ref(), Some((job_id, _)) if *job_id == id) {
                *cancel = None;
            }
        }

        let outcome = match &result {
            Ok(output) => {
                tracing::info!(
                    job_id = id,
                    path = %output.path.display(),
                    size_bytes = output.size_bytes,
                    "Export finished"
                );
                JobOutcome::Completed(output.clone())
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(job_id = id, "Export cancelled");
                JobOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!(job_id = id, error = %e, "Export failed");
                JobOutcome::Failed(e.to_string())
            }
        };
        if let Some(job) = lock(&self.job).as_mut().filter(|job| job.id == id) {
            if matches!(outcome, JobOutcome::Completed(_)) {
                job.progress = 1.0;
            }
            job.result.get_or_insert(outcome);
        }
        if self.current_id.load(Ordering::SeqCst) == id {
            self.current_id.store(0, Ordering::SeqCst);
        }

        result
    }

    async fn run_job<F>(
        &self,
        id: u64,
        clips: &[Clip],
        audio_clips: &[AudioClip],
        overlays: &[TextOverlay],
        settings: &ExportSettings,
        on_progress: F,
    ) -> ClipdeckResult<ExportOutput>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        // Registered before booting so a terminate() during startup reaches us.
        let cancel = CancelHandle::new();
        *lock(&self.cancel) = Some((id, cancel.clone()));

        tokio::select! {
            result = self.initialize() => result?,
            _ = cancel.cancelled() => {}
        }
        if self.is_stale(id, &cancel) {
            if self.engine.is_initialized() {
                // Booted after terminate() already ran; release it again.
                self.engine.terminate();
            }
            return Err(ClipdeckError::cancelled(format!(
                "Export {id} was cancelled during engine startup"
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_path = self.output_dir.join(format!(
            "export-{id}-{}.{}",
            chrono::Utc::now().format("%Y%m%d-%H%M%S"),
            settings.format.extension()
        ));

        let current = Arc::clone(&self.current_id);
        let job = Arc::clone(&self.job);
        let progress: EngineProgress = Arc::new(move |percent: f64| {
            if current.load(Ordering::SeqCst) != id {
                return;
            }
            let fraction = (percent / 100.0).clamp(0.0, 1.0);
            if let Some(job) = lock(&job).as_mut().filter(|job| job.id == id) {
                job.progress = fraction;
            }
            on_progress(fraction);
        });

        let request = ExportRequest {
            clips: clips.to_vec(),
            audio_clips: audio_clips.to_vec(),
            overlays: overlays.to_vec(),
            settings: settings.clone(),
            output_path,
        };

        let result = self.engine.export(&request, progress, cancel.clone()).await;

        if self.is_stale(id, &cancel) {
            if let Err(e) = tokio::fs::remove_file(&request.output_path).await {
                tracing::debug!(error = %e, "No partial output to remove");
            }
            return Err(ClipdeckError::cancelled(format!("Export {id} was cancelled")));
        }

        let path = result?;
        let size_bytes = tokio::fs::metadata(&path).await?.len();
        Ok(ExportOutput {
            path,
            size_bytes,
            format: settings.format,
        })
    }

    fn is_stale(&self, id: u64, cancel: &CancelHandle) -> bool {
        cancel.is_cancelled() || self.current_id.load(Ordering::SeqCst) != id
    }

    /// Tear down the engine. A running export fails with a cancellation error.
    pub fn terminate(&self) {
        self.current_id.store(0, Ordering::SeqCst);
        if let Some((id, cancel)) = lock(&self.cancel).take() {
            tracing::info!(job_id = id, "Cancelling in-flight export");
            cancel.cancel();
        }
        self.engine.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipdeck_project_model::clip::ClipKind;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Complete,
        Fail,
        WaitForCancel,
    }

    struct FakeEngine {
        mode: Mode,
        fail_init: bool,
        init_delay: Option<Duration>,
        initialized: AtomicBool,
        init_calls: AtomicUsize,
        export_calls: AtomicUsize,
        terminate_calls: AtomicUsize,
    }

    impl FakeEngine {
        fn new(mode: Mode) -> Self {
            Self {
                mode,
                fail_init: false,
                init_delay: None,
                initialized: AtomicBool::new(false),
                init_calls: AtomicUsize::new(0),
                export_calls: AtomicUsize::new(0),
                terminate_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranscodeEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        async fn initialize(&self) -> ClipdeckResult<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.init_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_init {
                return Err(ClipdeckError::unsupported("engine unavailable"));
            }
            self.initialized.store(true, Ordering::SeqCst);
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
        ) -> ClipdeckResult<PathBuf> {
            self.export_calls.fetch_add(1, Ordering::SeqCst);
            progress(0.0);
            match self.mode {
                Mode::Complete => {
                    progress(50.0);
                    tokio::fs::write(&request.output_path, b"fake-video").await?;
                    progress(100.0);
                    Ok(request.output_path.clone())
                }
                Mode::Fail => Err(ClipdeckError::render("encoder crashed")),
                Mode::WaitForCancel => {
                    progress(25.0);
                    cancel.cancelled().await;
                    progress(90.0);
                    Err(ClipdeckError::cancelled("killed"))
                }
            }
        }

        fn terminate(&self) {
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            self.initialized.store(false, Ordering::SeqCst);
        }
    }

    fn clips() -> Vec<Clip> {
        vec![
            Clip::new("a", "a.mp4", 0.0, 4.0, ClipKind::Video).unwrap(),
            Clip::new("b", "b.mp4", 2.0, 8.0, ClipKind::Video).unwrap(),
        ]
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(f64) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p| sink.lock().unwrap().push(p))
    }

    #[tokio::test]
    async fn test_export_reports_fractional_progress_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(Mode::Complete));
        let orchestrator = ExportOrchestrator::new(engine.clone(), dir.path());
        let (seen, on_progress) = recorder();

        let output = orchestrator
            .export_video(&clips(), &[], &[], &ExportSettings::default(), on_progress)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(output.size_bytes, 10);
        assert_eq!(output.format, ExportFormat::Mp4);
        assert_eq!(output.path.extension().unwrap(), "mp4");
        assert!(output.path.starts_with(dir.path()));

        let job = orchestrator.current_job().unwrap();
        assert_eq!(job.id, 1);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result, Some(JobOutcome::Completed(output)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_across_exports() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(Mode::Complete));
        let orchestrator = ExportOrchestrator::new(engine.clone(), dir.path());

        orchestrator.initialize().await.unwrap();
        orchestrator.initialize().await.unwrap();
        for _ in 0..2 {
            orchestrator
                .export_video(&clips(), &[], &[], &ExportSettings::default(), |_| {})
                .await
                .unwrap();
        }

        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.current_job().unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_engine_failure_is_terminal_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(Mode::Fail));
        let orchestrator = ExportOrchestrator::new(engine.clone(), dir.path());

        let err = orchestrator
            .export_video(&clips(), &[], &[], &ExportSettings::default(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ClipdeckError::Render { .. }));
        assert_eq!(engine.export_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            orchestrator.current_job().unwrap().result,
            Some(JobOutcome::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_initialization_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeEngine::new(Mode::Complete);
        fake.fail_init = true;
        let engine = Arc::new(fake);
        let orchestrator = ExportOrchestrator::new(engine.clone(), dir.path());

        let err = orchestrator
            .export_video(&clips(), &[], &[], &ExportSettings::default(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ClipdeckError::Unsupported { .. }));
        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.export_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_terminate_cancels_in_flight_export_and_drops_late_progress() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(Mode::WaitForCancel));
        let orchestrator = Arc::new(ExportOrchestrator::new(engine.clone(), dir.path()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::new(Notify::new());
        let on_progress = {
            let seen = Arc::clone(&seen);
            let started = Arc::clone(&started);
            move |p: f64| {
                seen.lock().unwrap().push(p);
                if p >= 0.25 {
                    started.notify_one();
                }
            }
        };

        let task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .export_video(&clips(), &[], &[], &ExportSettings::default(), on_progress)
                    .await
            })
        };

        started.notified().await;
        orchestrator.terminate();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.25]);
        assert_eq!(engine.terminate_calls.load(Ordering::SeqCst), 1);
        assert!(!engine.is_initialized());
        assert_eq!(
            orchestrator.current_job().unwrap().result,
            Some(JobOutcome::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_during_engine_startup_cancels_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let mut fake = FakeEngine::new(Mode::Complete);
        fake.init_delay = Some(Duration::from_secs(30));
        let engine = Arc::new(fake);
        let orchestrator = Arc::new(ExportOrchestrator::new(engine.clone(), dir.path()));
        let started = tokio::time::Instant::now();

        let task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .export_video(&clips(), &[], &[], &ExportSettings::default(), |_| {})
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.terminate();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(engine.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.export_calls.load(Ordering::SeqCst), 0);
        assert!(!engine.is_initialized());
        assert_eq!(
            orchestrator.current_job().unwrap().result,
            Some(JobOutcome::Cancelled)
        );
    }

    #[test]
    fn test_estimate_size_for_ten_seconds_at_medium() {
        let clip = Clip::new("a", "a.mp4", 0.0, 10.0, ClipKind::Video).unwrap();
        let bytes = estimate_size_bytes(&[clip], QualityPreset::Medium);
        assert_eq!(bytes, 3_125_000);
    }

    #[test]
    fn test_estimate_size_scales_with_duration_and_bitrate() {
        let short = [Clip::new("a", "a.mp4", 0.0, 5.0, ClipKind::Video).unwrap()];
        let long = [Clip::new("a", "a.mp4", 0.0, 10.0, ClipKind::Video).unwrap()];
        assert_eq!(
            estimate_size_bytes(&long, QualityPreset::Low),
            2 * estimate_size_bytes(&short, QualityPreset::Low)
        );
        assert!(
            estimate_size_bytes(&long, QualityPreset::Uhd4k)
                > estimate_size_bytes(&long, QualityPreset::High)
        );
        assert_eq!(estimate_size_bytes(&[], QualityPreset::High), 0);
    }
}
