//! The file to download and where it goes.
//!
//! # Examples
//!
//! ```rust
//! use fastget::download::DownloadTarget;
//! use std::convert::TryFrom;
//!
//! let target = DownloadTarget::try_from("https://example.com/file.zip")?;
//! assert_eq!(target.destination.to_str(), Some("file.zip"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use super::hash::ExpectedHash;
use crate::error::Error;
use crate::utils::filename::filename_from_url;

use reqwest::Url;
use std::convert::TryFrom;
use std::path::PathBuf;

/// Represents a file to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// URL of the resource.
    pub url: Url,
    /// Where the file is written. Relative paths resolve against the
    /// downloader directory.
    pub destination: PathBuf,
    /// Size of the resource, filled in once it has been probed.
    pub expected_size: Option<u64>,
    /// Digest the finished file must match.
    pub hash: Option<ExpectedHash>,
}

impl DownloadTarget {
    /// Creates a new [`DownloadTarget`].
    ///
    /// When using [`DownloadTarget::try_from`], the destination is the last
    /// segment of the URL path.
    pub fn new(url: &Url, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.clone(),
            destination: destination.into(),
            expected_size: None,
            hash: None,
        }
    }

    /// Attach the digest the file must match.
    pub fn with_hash(self, hash: ExpectedHash) -> Self {
        Self {
            hash: Some(hash),
            ..self
        }
    }

    /// Copy of this target with the probed size filled in.
    pub fn with_size(&self, size: Option<u64>) -> Self {
        Self {
            expected_size: size,
            ..self.clone()
        }
    }
}

fn check_scheme(url: &Url) -> Result<(), Error> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidUrl(format!(
            "The url \"{}\" uses the unsupported scheme {}",
            url, other
        ))),
    }
}

impl TryFrom<&Url> for DownloadTarget {
    type Error = crate::error::Error;

    fn try_from(value: &Url) -> Result<Self, Self::Error> {
        check_scheme(value)?;
        Ok(DownloadTarget::new(value, filename_from_url(value)))
    }
}

impl TryFrom<&str> for DownloadTarget {
    type Error = crate::error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Url::parse(value)
            .map_err(|e| {
                Error::InvalidUrl(format!("The url \"{}\" cannot be parsed: {}", value, e))
            })
            .and_then(|u| DownloadTarget::try_from(&u))
    }
}
