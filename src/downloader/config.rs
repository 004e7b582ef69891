//! Configuration structures and defaults for the downloader.
//!
//! # Example
//!
//! ```rust
//! use fastget::downloader::DownloadCallback;
//! use fastget::download::{Summary, Status};
//!
//! let callback: DownloadCallback = Box::new(|summary: &Summary| {
//!     match summary.status() {
//!         Status::Success => println!("✓ Downloaded: {:?}", summary.target().destination),
//!         Status::Fail(msg) => println!("✗ Failed: {:?} - {}", summary.target().destination, msg),
//!         _ => {}
//!     }
//! });
//! ```

use crate::download::{DownloadTarget, Summary};
use crate::progress::ProgressCallback;
use crate::segment::RetrySettings;

use reqwest::header::HeaderMap;
use std::env::current_dir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Callback type for download completion events
pub type DownloadCallback = Box<dyn Fn(&Summary) + Send + Sync>;

/// Default number of connections per file.
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;
/// Default chunk size, 8 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;
/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration structure for the downloader
#[derive(Clone)]
pub struct DownloaderConfig {
    /// Directory relative destinations resolve against.
    pub directory: PathBuf,
    /// Connections opened per file.
    pub max_connections: usize,
    /// Size of each planned chunk.
    pub chunk_size: u64,
    /// Longest wait for the server within one attempt.
    pub attempt_timeout: Duration,
    /// Retries and backoff of chunks and single-stream transfers.
    pub retry: RetrySettings,
    /// Extra probe attempts before falling back to a single stream.
    pub probe_retries: u32,
    /// Number of files downloaded at once.
    pub concurrent_downloads: usize,
    /// Where resume records live. `None` keeps them next to each file.
    pub resume_directory: Option<PathBuf>,
    /// Custom HTTP headers.
    pub headers: Option<HeaderMap>,
    /// Optional proxy configuration.
    pub proxy: Option<reqwest::Proxy>,
    /// Ignore existing files and resume records.
    pub overwrite: bool,
    /// Callback for when each download completes.
    pub on_complete: Option<Arc<DownloadCallback>>,
    /// Callback for progress of each download.
    pub on_progress: Option<ProgressCallback>,
    /// Connection cap shared by every file.
    pub connection_limit: Option<Arc<Semaphore>>,
}

impl DownloaderConfig {
    /// Path a target is written to.
    pub fn destination_for(&self, target: &DownloadTarget) -> PathBuf {
        self.directory.join(&target.destination)
    }

    /// Directory holding the resume record of `destination`.
    pub fn resume_directory_for(&self, destination: &Path) -> PathBuf {
        match self.resume_directory {
            Some(ref dir) => dir.clone(),
            None => destination
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for DownloaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloaderConfig")
            .field("directory", &self.directory)
            .field("max_connections", &self.max_connections)
            .field("chunk_size", &self.chunk_size)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry", &self.retry)
            .field("probe_retries", &self.probe_retries)
            .field("concurrent_downloads", &self.concurrent_downloads)
            .field("resume_directory", &self.resume_directory)
            .field("headers", &self.headers)
            .field("proxy", &self.proxy.is_some())
            .field("overwrite", &self.overwrite)
            .field("on_complete", &self.on_complete.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("connection_limit", &self.connection_limit.is_some())
            .finish()
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            directory: current_dir().unwrap_or_default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry: RetrySettings::default(),
            probe_retries: 2,
            concurrent_downloads: 4,
            resume_directory: None,
            headers: None,
            proxy: None,
            overwrite: false,
            on_complete: None,
            on_progress: None,
            connection_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.chunk_size, 8 << 20);
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.min_backoff, Duration::from_secs(1));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_paths() {
        let config = DownloaderConfig {
            directory: PathBuf::from("/data"),
            ..DownloaderConfig::default()
        };
        let url = Url::parse("https://example.com/f.bin").unwrap();
        let target = DownloadTarget::new(&url, "sub/f.bin");
        let destination = config.destination_for(&target);
        assert_eq!(destination, PathBuf::from("/data/sub/f.bin"));
        assert_eq!(
            config.resume_directory_for(&destination),
            PathBuf::from("/data/sub")
        );

        let config = DownloaderConfig {
            resume_directory: Some(PathBuf::from("/state")),
            ..config
        };
        assert_eq!(
            config.resume_directory_for(&destination),
            PathBuf::from("/state")
        );
    }
}
