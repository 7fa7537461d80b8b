//! Clipdeck Recording Ingestion
//!
//! Reconciles a live, open-ended capture stream with a request/response
//! upload API that wants discrete chunks.
//!
//! # Architecture
//!
//! ```text
//! capture ──push──► ChunkSink ──► [chunk 0][chunk 1][chunk 2] ...
//!                                     ▲
//!                       upload_index ─┘  (uploader task, polls every 1s)
//!                                     │
//!                                     ▼
//!                      UploadClient::upload(fileId, status=uploading)
//!
//! stop() ──► concat(unsent chunks) ──► upload(status=completed) ──► session closed
//! ```

pub mod pipeline;
pub mod session;
pub mod upload;

pub use pipeline::*;
pub use session::*;
pub use upload::*;
