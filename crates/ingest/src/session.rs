//! Remote upload session bookkeeping.

use serde::{Deserialize, Serialize};

/// Status tag sent with every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// More chunks will follow.
    Uploading,
    /// Final chunk; the remote store may assemble the file.
    Completed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
        }
    }
}

/// One remote upload session, alive from the first acknowledged request
/// until the completed chunk is acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSession {
    /// Identifier issued by the remote store.
    pub file_id: String,

    /// Index of the next chunk to upload.
    pub chunk_index: usize,

    pub status: UploadStatus,

    /// Wall-clock time the session was opened (RFC 3339).
    pub started_at: String,
}

impl RecordingSession {
    pub fn new(file_id: impl Into<String>, started_at: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            chunk_index: 0,
            status: UploadStatus::Uploading,
            started_at: started_at.into(),
        }
    }
}

/// Running counters for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub chunks_captured: u64,
    pub chunks_uploaded: u64,
    pub bytes_captured: u64,
    pub bytes_uploaded: u64,
    pub failed_attempts: u64,
}
