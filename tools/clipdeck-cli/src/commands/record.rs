//! Stream a file through the chunked upload pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clipdeck_common::config::AppConfig;
use clipdeck_ingest::{
    feed_from_reader, HttpUploadClient, HttpUploadConfig, IngestConfig, RecordingPipeline,
};

const FINAL_UPLOAD_ATTEMPTS: u32 = 3;

pub async fn run(
    file: PathBuf,
    upload_url: Option<String>,
    chunk_bytes: usize,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mut defaults = config.recording.clone();
    if let Some(url) = upload_url {
        defaults.upload_base_url = url;
    }

    println!("Streaming: {}", file.display());
    println!("  Upload service: {}", defaults.upload_base_url);

    let client = HttpUploadClient::new(HttpUploadConfig::from(&defaults))?;
    let mut pipeline = RecordingPipeline::new(Arc::new(client), IngestConfig::from(&defaults));
    pipeline.start().await?;
    if let Some(session) = pipeline.session() {
        println!("  Session: {}", session.file_id);
    }
    println!("Recording... Press Ctrl+C to stop.");

    let reader = tokio::fs::File::open(&file).await?;
    let sink = pipeline.sink();
    tokio::select! {
        fed = feed_from_reader(&sink, reader, chunk_bytes, defaults.chunk_interval()) => {
            println!("  Source exhausted after {} chunk(s)", fed?);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n  Interrupted; flushing buffered chunks");
        }
    }

    // The session survives a failed final upload, so retrying reuses it.
    let mut attempt = 1;
    let report = loop {
        match pipeline.stop().await {
            Ok(report) => break report,
            Err(e) if attempt < FINAL_UPLOAD_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "Final upload failed; retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let stats = pipeline.stats();
    println!("Recording uploaded: {}", report.file_id);
    println!(
        "  Chunks: {} ({} sent live, {} in final upload)",
        report.total_chunks,
        report.total_chunks - report.chunks_in_final,
        report.chunks_in_final
    );
    println!("  Bytes uploaded: {}", stats.bytes_uploaded);
    println!("  Failed attempts: {}", stats.failed_attempts);
    if let Some(reason) = pipeline.upload_error() {
        println!("  Live upload stopped early: {reason}");
    }
    println!("  Duration: {:.1}s", report.duration_secs);

    Ok(())
}
