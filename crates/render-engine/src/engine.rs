//! Transcoding engine contract.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use clipdeck_common::error::ClipdeckResult;
use clipdeck_project_model::clip::{AudioClip, Clip};
use clipdeck_project_model::overlay::TextOverlay;
use clipdeck_project_model::settings::ExportSettings;
use clipdeck_timeline::segments::total_trimmed_duration;

/// Everything an engine needs to render one export.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Video clips in timeline order.
    pub clips: Vec<Clip>,
    pub audio_clips: Vec<AudioClip>,
    pub overlays: Vec<TextOverlay>,
    pub settings: ExportSettings,
    pub output_path: PathBuf,
}

impl ExportRequest {
    /// Length of the rendered output in seconds.
    pub fn output_duration(&self) -> f64 {
        total_trimmed_duration(&self.clips)
    }
}

/// Engine progress callback, invoked with a percentage in `[0, 100]`.
pub type EngineProgress = Arc<dyn Fn(f64) + Send + Sync>;

/// Shared cancellation signal for one export.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn same_as(&self, other: &CancelHandle) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// A transcoding engine with an explicit lifecycle.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Boot the engine. Calling it again on a ready engine is a no-op.
    async fn initialize(&self) -> ClipdeckResult<()>;

    fn is_initialized(&self) -> bool;

    /// Render `request` to `request.output_path`.
    ///
    /// Must return `ClipdeckError::Cancelled` promptly once `cancel` fires.
    async fn export(
        &self,
        request: &ExportRequest,
        progress: EngineProgress,
        cancel: CancelHandle,
    ) -> ClipdeckResult<PathBuf>;

    /// Release engine resources. In-flight exports are cancelled.
    fn terminate(&self);
}
