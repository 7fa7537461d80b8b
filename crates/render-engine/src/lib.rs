//! Clipdeck Render Engine
//!
//! Turns an edited clip sequence into one encoded file by driving a
//! transcoding engine.
//!
//! # Pipeline Architecture
//!
//! ```text
//! clip 0 (-ss/-to) ──┐
//! clip 1 (-ss/-to) ──┼── scale+pad to preset ── fps ── concat ── drawtext ──┐
//! clip N (-ss/-to) ──┘                                                     │
//!                                                                          ├── encode ── output.{mp4,webm,gif}
//! audio 0 ── adelay ── volume ──┐                                          │
//! audio M ── adelay ── volume ──┴── amix ──────────────────────────────────┘
//! ```
//!
//! [`ExportOrchestrator`] owns job bookkeeping (ids, fractional progress,
//! cancellation); [`TranscodeEngine`] implementations do the encoding.

pub mod engine;
pub mod ffmpeg;
pub mod orchestrator;
pub mod probe;

pub use engine::*;
pub use ffmpeg::FfmpegEngine;
pub use orchestrator::*;
pub use probe::FfprobeProbe;
