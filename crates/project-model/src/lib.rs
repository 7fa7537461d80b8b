//! Clipdeck Project Model
//!
//! Defines the data contracts shared by playback, recording and export:
//! - **Clips:** references to source media with an in/out trim range
//! - **Overlays:** text shown over a timeline interval
//! - **Settings:** export quality presets and formats
//! - **Project:** the persisted snapshot the surrounding app saves/restores
//!
//! All times are seconds as `f64`. Source times are relative to one media
//! file; timeline times are relative to the start of the edited sequence.

pub mod clip;
pub mod overlay;
pub mod project;
pub mod settings;

pub use clip::*;
pub use overlay::*;
pub use project::*;
pub use settings::*;
