//! Downloader module containing the driver, its builder and configuration.
//!
//! - `downloader` - [`Downloader`], running every target as its own session
//! - `session` - [`DownloadSession`], the per-target state machine
//! - `builder` - [`DownloaderBuilder`] for configuration
//! - `config` - Configuration structures and callback types
//!
//! # Example
//!
//! ```rust
//! use fastget::downloader::DownloaderBuilder;
//! use std::path::PathBuf;
//!
//! let downloader = DownloaderBuilder::new()
//!     .directory(PathBuf::from("./downloads"))
//!     .concurrent_downloads(5)
//!     .retries(3)
//!     .on_complete(|summary| {
//!         println!("Downloaded: {:?}", summary.target().destination);
//!     })
//!     .build();
//! ```

pub mod builder;
pub mod config;
pub mod downloader;
pub mod session;

pub use builder::DownloaderBuilder;
pub use config::{DownloadCallback, DownloaderConfig};
pub use downloader::Downloader;
pub use session::{DownloadSession, SessionState};
