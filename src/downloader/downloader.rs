//! Core downloader implementation.
//!
//! The [`Downloader`] runs one [`DownloadSession`] per target. Sessions are
//! independent: a failing target never aborts the others.
//!
//! # Examples
//!
//! ```rust,no_run
//! use fastget::downloader::DownloaderBuilder;
//! use fastget::download::DownloadTarget;
//! use std::convert::TryFrom;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = DownloaderBuilder::new().build();
//! let targets = vec![
//!     DownloadTarget::try_from("https://example.com/file1.zip")?,
//!     DownloadTarget::try_from("https://example.com/file2.pdf")?,
//! ];
//!
//! let summaries = downloader.download(&targets).await;
//! for summary in summaries {
//!     println!("{:?}: {:?}", summary.target().destination, summary.status());
//! }
//! # Ok(())
//! # }
//! ```

use super::config::DownloaderConfig;
use super::session::{self, DownloadSession};
use crate::download::{DownloadTarget, Summary};
use crate::error::{Error, Result};
use crate::http::{create_http_client, HttpClientConfig};

use futures::stream::{self, StreamExt};
use reqwest_middleware::ClientWithMiddleware;
use std::fmt;
use std::fmt::Debug;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Represents the download controller.
///
/// A downloader can be created via its builder:
///
/// ```rust
/// # fn main()  {
/// use fastget::downloader::DownloaderBuilder;
///
/// let d = DownloaderBuilder::new().build();
/// # }
/// ```
#[derive(Clone)]
pub struct Downloader {
    config: DownloaderConfig,
}

impl Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .finish()
    }
}

impl Downloader {
    /// Creates a new Downloader with the given configuration.
    pub(crate) fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Gets the directory relative destinations resolve against.
    pub fn directory(&self) -> &PathBuf {
        &self.config.directory
    }

    /// Gets the number of retries per chunk.
    pub fn retries(&self) -> u32 {
        self.config.retry.max_retries
    }

    /// Gets the number of connections per file.
    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    /// Gets the chunk size.
    pub fn chunk_size(&self) -> u64 {
        self.config.chunk_size
    }

    /// Gets the number of concurrent downloads.
    pub fn concurrent_downloads(&self) -> usize {
        self.config.concurrent_downloads
    }

    /// Gets whether to overwrite existing files.
    pub fn overwrite(&self) -> bool {
        self.config.overwrite
    }

    /// Starts the downloads.
    ///
    /// Returns one summary per target, in completion order.
    pub async fn download(&self, targets: &[DownloadTarget]) -> Vec<Summary> {
        self.download_with_cancel(targets, CancellationToken::new())
            .await
    }

    /// Starts the downloads, stopping cooperatively once `cancel` fires.
    ///
    /// Cancelled targets keep their partial file and resume record.
    pub async fn download_with_cancel(
        &self,
        targets: &[DownloadTarget],
        cancel: CancellationToken,
    ) -> Vec<Summary> {
        let config = HttpClientConfig {
            retries: 0,
            proxy: self.config.proxy.clone(),
            headers: self.config.headers.clone(),
            connect_timeout: Some(self.config.attempt_timeout),
        };

        let client = match create_http_client(config) {
            Ok(client) => client,
            Err(e) => {
                let error = Error::from(e);
                return targets
                    .iter()
                    .map(|t| self.complete(Summary::new(t.clone()).fail_with(&error)))
                    .collect();
            }
        };

        stream::iter(targets)
            .map(|t| self.fetch(&client, t, cancel.clone()))
            .buffer_unordered(self.config.concurrent_downloads.max(1))
            .collect::<Vec<_>>()
            .await
    }

    /// Remove the resume record of `target`.
    ///
    /// Useful after a hash mismatch, which keeps both the file and its
    /// record so the caller can decide what to do with them.
    pub async fn discard_resume_state(&self, target: &DownloadTarget) -> Result<()> {
        let destination = self.config.destination_for(target);
        session::discard(&self.config, target, &destination).await
    }

    async fn fetch(
        &self,
        client: &ClientWithMiddleware,
        target: &DownloadTarget,
        cancel: CancellationToken,
    ) -> Summary {
        debug!("Fetching {}", &target.url);
        let summary = DownloadSession::new(&self.config, client, target, cancel)
            .run()
            .await;
        self.complete(summary)
    }

    fn complete(&self, summary: Summary) -> Summary {
        if let Some(ref callback) = self.config.on_complete {
            callback(&summary);
        }
        summary
    }
}
