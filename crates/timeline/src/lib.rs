//! Clipdeck Timeline
//!
//! Keeps a single visible player in step with an edited timeline built from
//! many source files.
//!
//! # Architecture
//!
//! ```text
//!  clips ──► build_playback_segments ──► [PlaybackSegment] ──┐
//!                                                            ▼
//!  scrubber ── seek(t) ──────────────────────────► PlaybackController ──► MediaElement
//!                                                            ▲               │
//!  native tick ── on_source_time_update(src_t) ──────────────┘◄──────────────┘
//! ```
//!
//! Timeline writes and media reads are reconciled through an epsilon guard so
//! the two clocks never chase each other.

pub mod import;
pub mod playback;
pub mod segments;
pub mod state;
pub mod time;

pub use import::*;
pub use playback::*;
pub use segments::*;
pub use state::*;
pub use time::*;
