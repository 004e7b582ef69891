//! Shared utility functions.
//!
//! - [`content_length`] - Content-Range and Content-Length parsing
//! - [`size`] - Human readable byte sizes
//! - [`filename`] - File names derived from URLs

pub mod content_length;
pub mod filename;
pub mod size;

pub use content_length::{
    get_content_length, parse_content_range, parse_content_range_total, response_content_range,
    ContentRange,
};
pub use filename::{filename_from_url, DEFAULT_FILENAME};
pub use size::{format_bytes, parse_size};
