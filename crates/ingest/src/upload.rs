//! Upload collaborator contract and its HTTP implementation.
//!
//! The remote store is idempotent by session, not by chunk: every request
//! carries the `fileId`, and a request without one opens a new session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use clipdeck_common::config::RecordingDefaults;

use crate::session::UploadStatus;

/// One chunk upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    /// `None` asks the remote store to open a new session.
    pub file_id: Option<String>,
    pub status: UploadStatus,
    pub data: Vec<u8>,
}

/// Acknowledgement returned by the remote store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAck {
    pub file_id: String,
}

pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Client errors (4xx) will not succeed on retry; everything else might.
    ///
    /// The background uploader stops on a non-retryable error and leaves the
    /// remaining chunks to the final upload.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_) => true,
            UploadError::Rejected { status, .. } => *status >= 500 || *status == 429,
            UploadError::InvalidResponse(_) => false,
        }
    }
}

/// The remote chunk store.
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Open a session and return its `fileId` (one round trip).
    async fn open_session(&self) -> UploadResult<String>;

    /// Upload one chunk.
    async fn upload(&self, request: UploadRequest) -> UploadResult<UploadAck>;
}

/// Configuration for [`HttpUploadClient`].
#[derive(Debug, Clone)]
pub struct HttpUploadConfig {
    /// Base URL; requests go to `{base_url}/upload`.
    pub base_url: String,
    pub timeout: Duration,
    /// MIME type declared for chunk parts.
    pub chunk_mime: String,
}

impl Default for HttpUploadConfig {
    fn default() -> Self {
        Self::from(&RecordingDefaults::default())
    }
}

impl From<&RecordingDefaults> for HttpUploadConfig {
    fn from(defaults: &RecordingDefaults) -> Self {
        Self {
            base_url: defaults.upload_base_url.trim_end_matches('/').to_string(),
            timeout: defaults.upload_timeout(),
            chunk_mime: "video/webm".to_string(),
        }
    }
}

/// `POST {base}/upload` with a multipart `{ file, fileId?, status }` body.
pub struct HttpUploadClient {
    http: Client,
    config: HttpUploadConfig,
}

impl HttpUploadClient {
    pub fn new(config: HttpUploadConfig) -> UploadResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(UploadError::Network)?;
        Ok(Self { http, config })
    }

    fn upload_url(&self) -> String {
        format!("{}/upload", self.config.base_url)
    }

    fn build_form(&self, request: UploadRequest) -> UploadResult<Form> {
        let file = Part::bytes(request.data)
            .file_name("chunk")
            .mime_str(&self.config.chunk_mime)?;
        let mut form = Form::new()
            .part("file", file)
            .text("status", request.status.as_str());
        if let Some(file_id) = request.file_id {
            form = form.text("fileId", file_id);
        }
        Ok(form)
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn open_session(&self) -> UploadResult<String> {
        // The first request without a fileId makes the store issue one.
        let ack = self
            .upload(UploadRequest {
                file_id: None,
                status: UploadStatus::Uploading,
                data: Vec::new(),
            })
            .await?;
        Ok(ack.file_id)
    }

    async fn upload(&self, request: UploadRequest) -> UploadResult<UploadAck> {
        let bytes = request.data.len();
        let status = request.status;
        let form = self.build_form(request)?;

        let response = self.http.post(self.upload_url()).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, body });
        }

        let body = response.text().await?;
        let ack: UploadAck = serde_json::from_str(&body)
            .map_err(|e| UploadError::InvalidResponse(format!("{e}: {body}")))?;
        tracing::debug!(file_id = %ack.file_id, bytes, status = status.as_str(), "Chunk acknowledged");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpUploadClient {
        HttpUploadClient::new(HttpUploadConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            chunk_mime: "video/webm".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_session_returns_issued_file_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "fileId": "rec-42" })))
            .expect(1)
            .mount(&server)
            .await;

        let file_id = client_for(&server).open_session().await.unwrap();
        assert_eq!(file_id, "rec-42");
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(body_string_contains("name=\"fileId\""))
            .and(body_string_contains("rec-7"))
            .and(body_string_contains("completed"))
            .and(body_string_contains("chunk-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "fileId": "rec-7" })))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client_for(&server)
            .upload(UploadRequest {
                file_id: Some("rec-7".to_string()),
                status: UploadStatus::Completed,
                data: b"chunk-bytes".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(ack.file_id, "rec-7");
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client_for(&server).open_session().await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_ack_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = client_for(&server).open_session().await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }
}
