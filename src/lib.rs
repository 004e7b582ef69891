//! Fastget downloads files over HTTP(S) using several connections per file.
//!
//! A file is split into byte ranges that are fetched concurrently and written
//! in place. Completed ranges are recorded next to the file, so an
//! interrupted download picks up where it stopped. Servers that ignore
//! `Range` requests are downloaded with a single stream instead.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use fastget::{download::DownloadTarget, downloader::DownloaderBuilder, Error};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let reqwest_rs = "https://github.com/seanmonstar/reqwest/archive/refs/tags/v0.11.9.zip";
//! let targets = vec![DownloadTarget::try_from(reqwest_rs)?];
//! let downloader = DownloaderBuilder::new()
//!     .directory(PathBuf::from("output"))
//!     .max_connections(8)
//!     .build();
//! downloader.download(&targets).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`download`] - Download targets, summaries and hash verification
//! - [`downloader`] - The [`Downloader`], its builder and per-target sessions
//! - [`segment`] - Chunk planning, the worker pool and the single-stream fallback
//! - [`resume`] - Resume records and the store keeping them
//! - [`error`] - Centralized error handling with the `Error` enum
//! - [`http`] - HTTP client setup and the range probe
//! - [`progress`] - Progress counters and their terminal display
//! - [`utils`] - Shared utility functions

pub mod download;
pub mod downloader;
pub mod error;
pub mod http;
pub mod progress;
pub mod resume;
pub mod segment;
pub mod utils;

pub use download::{DownloadTarget, ExpectedHash, HashAlgorithm, Status, Summary, Verification};
pub use downloader::{Downloader, DownloaderBuilder};
pub use error::{Error, ErrorKind, Result};
pub use http::{create_http_client, HttpClientConfig};
pub use progress::{ProgressBarOpts, ProgressDisplay, ProgressEvent, StyleOptions};
pub use segment::{ByteRange, ChunkPlanner, RetrySettings};
pub use utils::{format_bytes, parse_size};
