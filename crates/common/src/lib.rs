//! Clipdeck Common Utilities
//!
//! Shared infrastructure for all Clipdeck crates:
//! - Error types and result aliases
//! - Clock utilities for reconciling the media clock with the timeline clock
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
