//! Recording pipeline: chunk buffer, background uploader, and finalization.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use clipdeck_common::clock::RecordingClock;
use clipdeck_common::config::RecordingDefaults;
use clipdeck_common::error::{ClipdeckError, ClipdeckResult};

use crate::session::{IngestStats, RecordingSession, UploadStatus};
use crate::upload::{UploadClient, UploadRequest};

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// How long the uploader waits before re-checking for the next chunk.
    pub poll_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from(&RecordingDefaults::default())
    }
}

impl From<&RecordingDefaults> for IngestConfig {
    fn from(defaults: &RecordingDefaults) -> Self {
        Self {
            poll_interval: defaults.poll_interval(),
        }
    }
}

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, no session yet.
    Idle,
    /// Accepting chunks; uploader running.
    Recording,
    /// Capture stopped; final chunk not yet acknowledged.
    Finalizing,
    /// Final chunk acknowledged, session closed.
    Completed,
}

/// Summary returned by a successful [`RecordingPipeline::stop`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    pub file_id: String,
    pub total_chunks: usize,
    /// Chunks that were still unsent at stop and went out in the final request.
    pub chunks_in_final: usize,
    pub final_bytes: usize,
    pub duration_secs: f64,
}

/// Chunk buffer plus session bookkeeping.
///
/// `chunks` only holds chunks that are not yet acknowledged; `chunks[0]` has
/// index `first_index`, which always equals `upload_index`.
#[derive(Debug)]
struct Shared {
    state: PipelineState,
    chunks: VecDeque<Vec<u8>>,
    first_index: usize,
    upload_index: usize,
    session: Option<RecordingSession>,
    stats: IngestStats,
    upload_error: Option<String>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            chunks: VecDeque::new(),
            first_index: 0,
            upload_index: 0,
            session: None,
            stats: IngestStats::default(),
            upload_error: None,
        }
    }

    /// Number of chunks captured so far, released ones included.
    fn captured(&self) -> usize {
        self.first_index + self.chunks.len()
    }

    fn chunk(&self, index: usize) -> Option<&Vec<u8>> {
        index
            .checked_sub(self.first_index)
            .and_then(|offset| self.chunks.get(offset))
    }

    /// Drop acknowledged chunks up to and including `index`.
    fn acknowledge(&mut self, index: usize) {
        while self.first_index <= index && self.chunks.pop_front().is_some() {
            self.first_index += 1;
        }
        self.upload_index = self.upload_index.max(index + 1);
    }

    fn retained_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle the capture side pushes chunks into.
#[derive(Debug, Clone)]
pub struct ChunkSink {
    shared: Arc<Mutex<Shared>>,
}

impl ChunkSink {
    /// Append a chunk to the ordered buffer. Returns its index.
    pub fn push(&self, data: Vec<u8>) -> ClipdeckResult<usize> {
        let mut shared = lock(&self.shared);
        if shared.state != PipelineState::Recording {
            return Err(ClipdeckError::ingest(format!(
                "Cannot accept chunks while {:?}",
                shared.state
            )));
        }
        let index = shared.captured();
        shared.stats.chunks_captured += 1;
        shared.stats.bytes_captured += data.len() as u64;
        shared.chunks.push_back(data);
        tracing::trace!(index, "Chunk captured");
        Ok(index)
    }
}

/// Buffers capture chunks and uploads them in order while recording runs.
pub struct RecordingPipeline {
    client: Arc<dyn UploadClient>,
    config: IngestConfig,
    shared: Arc<Mutex<Shared>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    uploader: Option<JoinHandle<u64>>,
    clock: Option<RecordingClock>,
}

impl RecordingPipeline {
    pub fn new(client: Arc<dyn UploadClient>, config: IngestConfig) -> Self {
        Self {
            client,
            config,
            shared: Arc::new(Mutex::new(Shared::new())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            uploader: None,
            clock: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        lock(&self.shared).state
    }

    /// The open remote session, if any.
    pub fn session(&self) -> Option<RecordingSession> {
        lock(&self.shared).session.clone()
    }

    pub fn stats(&self) -> IngestStats {
        lock(&self.shared).stats.clone()
    }

    /// Bytes held for chunks that are not yet acknowledged.
    pub fn buffered_bytes(&self) -> usize {
        lock(&self.shared).retained_bytes()
    }

    /// Why the background uploader gave up, if it did.
    ///
    /// Chunks it could not send stay buffered and go out with the final
    /// upload in [`stop`](Self::stop).
    pub fn upload_error(&self) -> Option<String> {
        lock(&self.shared).upload_error.clone()
    }

    pub fn sink(&self) -> ChunkSink {
        ChunkSink {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn push_chunk(&self, data: Vec<u8>) -> ClipdeckResult<usize> {
        self.sink().push(data)
    }

    /// Open the remote session and start the background uploader.
    pub async fn start(&mut self) -> ClipdeckResult<()> {
        let state = self.state();
        if !matches!(state, PipelineState::Idle | PipelineState::Completed) {
            return Err(ClipdeckError::ingest(format!(
                "Cannot start recording while {state:?}"
            )));
        }

        let file_id = self
            .client
            .open_session()
            .await
            .map_err(|e| ClipdeckError::upload(format!("Failed to open upload session: {e}")))?;

        let clock = RecordingClock::start();
        {
            let mut shared = lock(&self.shared);
            *shared = Shared::new();
            shared.session = Some(RecordingSession::new(file_id.clone(), clock.epoch_wall()));
            shared.state = PipelineState::Recording;
        }
        self.clock = Some(clock);
        self.stop_flag.store(false, Ordering::SeqCst);

        self.uploader = Some(tokio::spawn(run_uploader(
            Arc::clone(&self.client),
            Arc::clone(&self.shared),
            Arc::clone(&self.stop_flag),
            Arc::clone(&self.wake),
            self.config.poll_interval,
        )));

        tracing::info!(%file_id, "Recording pipeline started");
        Ok(())
    }

    /// Stop capture, flush every unsent chunk as one `completed` upload,
    /// and close the session.
    ///
    /// If the final upload fails the session is kept and `stop` may be
    /// called again.
    pub async fn stop(&mut self) -> ClipdeckResult<FinalizeReport> {
        match self.state() {
            PipelineState::Recording => {
                tracing::info!("Stopping recording pipeline");
                {
                    let mut shared = lock(&self.shared);
                    shared.state = PipelineState::Finalizing;
                }
                self.stop_flag.store(true, Ordering::SeqCst);
                self.wake.notify_one();

                if let Some(handle) = self.uploader.take() {
                    match handle.await {
                        Ok(uploaded) => tracing::info!(uploaded, "Uploader drained"),
                        Err(e) => tracing::warn!(error = %e, "Uploader join failed"),
                    }
                }
            }
            PipelineState::Finalizing => {
                tracing::info!("Retrying final upload");
            }
            state => {
                return Err(ClipdeckError::ingest(format!(
                    "Cannot stop recording while {state:?}"
                )));
            }
        }

        let (file_id, first_unsent, total_chunks, data) = {
            let shared = lock(&self.shared);
            let session = shared
                .session
                .as_ref()
                .ok_or_else(|| ClipdeckError::ingest("No upload session to finalize"))?;
            let total_chunks = shared.captured();
            let first_unsent = shared.upload_index.min(total_chunks);
            let data: Vec<u8> = (first_unsent..total_chunks)
                .filter_map(|index| shared.chunk(index))
                .flat_map(|chunk| chunk.iter().copied())
                .collect();
            (session.file_id.clone(), first_unsent, total_chunks, data)
        };
        let chunks_in_final = total_chunks - first_unsent;
        let final_bytes = data.len();

        let result = self
            .client
            .upload(UploadRequest {
                file_id: Some(file_id.clone()),
                status: UploadStatus::Completed,
                data,
            })
            .await;

        if let Err(e) = result {
            lock(&self.shared).stats.failed_attempts += 1;
            tracing::warn!(%file_id, error = %e, "Final upload failed; session kept for retry");
            return Err(ClipdeckError::upload(format!("Final upload failed: {e}")));
        }

        {
            let mut shared = lock(&self.shared);
            if total_chunks > 0 {
                shared.acknowledge(total_chunks - 1);
            }
            shared.stats.chunks_uploaded += chunks_in_final as u64;
            shared.stats.bytes_uploaded += final_bytes as u64;
            if let Some(session) = shared.session.as_mut() {
                session.chunk_index = total_chunks;
                session.status = UploadStatus::Completed;
            }
            shared.session = None;
            shared.state = PipelineState::Completed;
        }

        let duration_secs = self
            .clock
            .as_ref()
            .map(RecordingClock::elapsed_secs)
            .unwrap_or(0.0);
        tracing::info!(
            %file_id,
            total_chunks,
            chunks_in_final,
            final_bytes,
            duration_secs,
            "Recording finalized"
        );

        Ok(FinalizeReport {
            file_id,
            total_chunks,
            chunks_in_final,
            final_bytes,
            duration_secs,
        })
    }
}

impl Drop for RecordingPipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.uploader.take() {
            handle.abort();
        }
    }
}

async fn run_uploader(
    client: Arc<dyn UploadClient>,
    shared: Arc<Mutex<Shared>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    poll_interval: Duration,
) -> u64 {
    let mut uploaded = 0u64;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let next = {
            let shared = lock(&shared);
            match (&shared.session, shared.chunk(shared.upload_index)) {
                (Some(session), Some(chunk)) => {
                    Some((shared.upload_index, session.file_id.clone(), chunk.clone()))
                }
                _ => None,
            }
        };

        let Some((index, file_id, data)) = next else {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = wake.notified() => {}
            }
            continue;
        };

        let bytes = data.len();
        let result = client
            .upload(UploadRequest {
                file_id: Some(file_id),
                status: UploadStatus::Uploading,
                data,
            })
            .await;

        match result {
            Ok(_) => {
                let mut shared = lock(&shared);
                shared.acknowledge(index);
                shared.stats.chunks_uploaded += 1;
                shared.stats.bytes_uploaded += bytes as u64;
                if let Some(session) = shared.session.as_mut() {
                    session.chunk_index = index + 1;
                }
                uploaded += 1;
                tracing::debug!(index, bytes, "Chunk uploaded");
            }
            Err(e) if !e.is_retryable() => {
                let mut shared = lock(&shared);
                shared.stats.failed_attempts += 1;
                shared.upload_error = Some(e.to_string());
                tracing::error!(
                    index,
                    error = %e,
                    "Chunk upload rejected; leaving remaining chunks for the final upload"
                );
                break;
            }
            Err(e) => {
                lock(&shared).stats.failed_attempts += 1;
                tracing::warn!(index, error = %e, "Chunk upload failed; retrying");
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = wake.notified() => {}
                }
            }
        }
    }

    uploaded
}

/// Feed a pipeline from a byte stream, one `chunk_size` chunk per `interval`.
///
/// Returns the number of chunks pushed. A short final read ends the feed.
pub async fn feed_from_reader<R>(
    sink: &ChunkSink,
    mut reader: R,
    chunk_size: usize,
    interval: Duration,
) -> ClipdeckResult<usize>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = chunk_size.max(1);
    let mut ticker = tokio::time::interval(interval);
    let mut pushed = 0;

    loop {
        ticker.tick().await;

        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0;
        while filled < chunk_size {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            break;
        }
        buf.truncate(filled);
        sink.push(buf)?;
        pushed += 1;

        if filled < chunk_size {
            break;
        }
    }

    Ok(pushed)
}
