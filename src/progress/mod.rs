//! Progress reporting.
//!
//! - `tracker` - Atomic per-download counters emitting [`ProgressEvent`]s
//! - `display` - indicatif bars fed from those events
//! - `style` - Progress bar styling options and templates

pub(crate) mod display;
pub(crate) mod style;
pub(crate) mod tracker;

pub use display::ProgressDisplay;
pub use style::{ProgressBarOpts, StyleOptions};
pub use tracker::{ProgressCallback, ProgressEvent, ProgressTracker};
