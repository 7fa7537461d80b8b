//! Clipdeck CLI: inspect project snapshots, stream recordings, export video.
//!
//! Usage:
//!   clipdeck info <SNAPSHOT>         Show project summary and size estimates
//!   clipdeck validate <SNAPSHOT>     Check clip ranges and source URLs
//!   clipdeck segments <SNAPSHOT>     Print playback segments
//!   clipdeck record <FILE>           Stream a file through the upload pipeline
//!   clipdeck export <SNAPSHOT>       Export the timeline to a video file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use clipdeck_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipdeck",
    about = "Timeline editing, chunked recording upload, and export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show project information
    Info {
        /// Path to the project snapshot (JSON)
        path: PathBuf,
    },

    /// Validate a project snapshot
    Validate {
        /// Path to the project snapshot (JSON)
        path: PathBuf,
    },

    /// Print the playback segments of a project
    Segments {
        /// Path to the project snapshot (JSON)
        path: PathBuf,

        /// Resolve this timeline time (seconds) to a source position
        #[arg(long)]
        at: Option<f64>,

        /// Print segments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream a media file through the chunked upload pipeline
    Record {
        /// File standing in for the live capture stream
        file: PathBuf,

        /// Upload service base URL (defaults to config)
        #[arg(long)]
        upload_url: Option<String>,

        /// Bytes per captured chunk
        #[arg(long, default_value = "262144")]
        chunk_bytes: usize,
    },

    /// Export a project to a video file
    Export {
        /// Path to the project snapshot (JSON)
        path: PathBuf,

        /// Quality preset: low|medium|high|4k
        #[arg(short, long)]
        quality: Option<String>,

        /// Output format: mp4|webm|gif
        #[arg(short, long)]
        format: Option<String>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Do not encode audio
        #[arg(long)]
        no_audio: bool,

        /// Output directory (defaults to config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    clipdeck_common::logging::init_logging(&logging)?;

    match cli.command {
        Commands::Info { path } => commands::info::run(path, &config),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Segments { path, at, json } => commands::segments::run(path, at, json),
        Commands::Record {
            file,
            upload_url,
            chunk_bytes,
        } => commands::record::run(file, upload_url, chunk_bytes, &config).await,
        Commands::Export {
            path,
            quality,
            format,
            fps,
            no_audio,
            output_dir,
        } => {
            commands::export::run(
                path,
                commands::export::ExportArgs {
                    quality,
                    format,
                    fps,
                    include_audio: !no_audio,
                    output_dir,
                },
                &config,
            )
            .await
        }
    }
}
