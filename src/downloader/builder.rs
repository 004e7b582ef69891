//! Builder pattern implementation for creating Downloader instances.
//!
//! ```rust
//! use fastget::downloader::DownloaderBuilder;
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! let downloader = DownloaderBuilder::new()
//!     .directory(PathBuf::from("./downloads"))
//!     .max_connections(8)
//!     .chunk_size(4 * 1024 * 1024)
//!     .attempt_timeout(Duration::from_secs(10))
//!     .retries(3)
//!     .build();
//! ```

use super::{config::DownloaderConfig, downloader::Downloader};
use crate::download::Summary;
use crate::progress::ProgressEvent;

use reqwest::header::{HeaderMap, HeaderValue, IntoHeaderName};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A builder used to create a [`Downloader`].
///
/// ```rust
/// # fn main()  {
/// use fastget::downloader::DownloaderBuilder;
///
/// let d = DownloaderBuilder::new().retries(5).directory("downloads".into()).build();
/// # }
/// ```
#[derive(Default)]
pub struct DownloaderBuilder {
    config: DownloaderConfig,
}

impl DownloaderBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        DownloaderBuilder::default()
    }

    /// Sets the directory relative destinations resolve against.
    pub fn directory(mut self, directory: PathBuf) -> Self {
        self.config.directory = directory;
        self
    }

    /// Set the number of connections opened per file.
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    /// Set the size of each planned chunk.
    ///
    /// The same value must be used to resume an interrupted download;
    /// records written with another chunk size are discarded.
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Set how long one attempt may wait on the server.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    /// Set the number of retries per chunk.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    /// Set the bounds of the exponential backoff between attempts.
    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.config.retry.min_backoff = min;
        self.config.retry.max_backoff = max;
        self
    }

    /// Set the number of extra probe attempts.
    pub fn probe_retries(mut self, retries: u32) -> Self {
        self.config.probe_retries = retries;
        self
    }

    /// Set the number of concurrent downloads.
    pub fn concurrent_downloads(mut self, concurrent_downloads: usize) -> Self {
        self.config.concurrent_downloads = concurrent_downloads;
        self
    }

    /// Keep resume records in `directory` instead of next to each file.
    pub fn resume_directory(mut self, directory: PathBuf) -> Self {
        self.config.resume_directory = Some(directory);
        self
    }

    /// Set the proxy used for every request.
    pub fn proxy(mut self, proxy: reqwest::Proxy) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Set callback for when each download completes.
    ///
    /// The callback will be called immediately when each download finishes,
    /// regardless of whether other downloads are still in progress.
    ///
    /// ```rust
    /// use fastget::downloader::DownloaderBuilder;
    /// use fastget::download::Status;
    ///
    /// let downloader = DownloaderBuilder::new()
    ///     .on_complete(|summary| {
    ///         match summary.status() {
    ///             Status::Success => println!("[Success] {:?}", summary.target().destination),
    ///             Status::Fail(error) => println!("[Failed] {:?} - {}", summary.target().destination, error),
    ///             _ => {}
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Summary) + Send + Sync + 'static,
    {
        self.config.on_complete = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Set callback receiving progress of every download.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.config.on_progress = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Share a connection cap with other downloaders.
    pub fn connection_limit(mut self, limit: Arc<Semaphore>) -> Self {
        self.config.connection_limit = Some(limit);
        self
    }

    /// Cap the connections of all files together. At least one connection
    /// is always allowed.
    pub fn max_total_connections(self, connections: usize) -> Self {
        self.connection_limit(Arc::new(Semaphore::new(connections.max(1))))
    }

    /// Set whether to ignore existing files and resume records.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    /// Helper method to get or create a new HeaderMap.
    fn new_header(&self) -> HeaderMap {
        match self.config.headers {
            Some(ref h) => h.to_owned(),
            _ => HeaderMap::new(),
        }
    }

    /// Add the http headers.
    ///
    /// You can call `.headers()` multiple times and all `HeaderMap` will be merged into a single one.
    ///
    /// ```
    /// use reqwest::header::{self, HeaderValue, HeaderMap};
    /// use fastget::downloader::DownloaderBuilder;
    ///
    /// let ua = HeaderValue::from_str("curl/7.87").expect("Invalid UA");
    ///
    /// let builder = DownloaderBuilder::new()
    ///     .headers(HeaderMap::from_iter([(header::USER_AGENT, ua)]))
    ///     .build();
    /// ```
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut new = self.new_header();
        new.extend(headers);

        self.config.headers = Some(new);
        self
    }

    /// Add the http header
    ///
    /// ```
    /// use reqwest::header::{self, HeaderValue};
    /// use fastget::downloader::DownloaderBuilder;
    ///
    /// let auth = HeaderValue::from_str("Basic aGk6MTIzNDU2Cg==").expect("Invalid auth");
    ///
    /// let builder = DownloaderBuilder::new()
    ///     .header(header::AUTHORIZATION, auth)
    ///     .build();
    /// ```
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        let mut new = self.new_header();

        new.insert(name, value);

        self.config.headers = Some(new);
        self
    }

    /// Create the [`Downloader`] with the specified options.
    pub fn build(self) -> Downloader {
        Downloader::new(self.config)
    }
}
