//! Download summary functionality.
//!
//! Every target yields exactly one [`Summary`] once its session ends.
//!
//! ```rust
//! use fastget::download::{DownloadTarget, Status, Summary};
//! use std::convert::TryFrom;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let target = DownloadTarget::try_from("https://example.com/file.zip")?;
//! let summary = Summary::new(target).fail("Network timeout");
//!
//! match summary.status() {
//!     Status::Success => println!("Download completed successfully"),
//!     Status::Fail(msg) => println!("Download failed: {}", msg),
//!     _ => {}
//! }
//! # Ok(())
//! # }
//! ```

use super::hash::Verification;
use super::target::DownloadTarget;
use crate::error::{Error, ErrorKind};

use std::time::Duration;

/// Download status enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Download failed with error message
    Fail(String),
    /// Download not yet started
    NotStarted,
    /// Download was skipped with reason
    Skipped(String),
    /// Download completed and verified
    Success,
    /// The bytes arrived but their digest is wrong
    HashMismatch(String),
    /// The session was cancelled by the caller
    Cancelled,
}

/// How the bytes were fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Concurrent ranged requests.
    Segmented,
    /// One request for the whole resource.
    SingleStream,
}

/// Represents a [`DownloadTarget`] summary.
#[derive(Debug, Clone)]
pub struct Summary {
    target: DownloadTarget,
    status: Status,
    error_kind: Option<ErrorKind>,
    transferred: u64,
    resumed: u64,
    total: Option<u64>,
    elapsed: Duration,
    verification: Option<Verification>,
    mode: Option<TransferMode>,
}

impl Summary {
    /// Create a new [`Summary`].
    pub fn new(target: DownloadTarget) -> Self {
        Self {
            target,
            status: Status::NotStarted,
            error_kind: None,
            transferred: 0,
            resumed: 0,
            total: None,
            elapsed: Duration::ZERO,
            verification: None,
            mode: None,
        }
    }

    /// Attach a status to a [`Summary`].
    pub fn with_status(self, status: Status) -> Self {
        Self { status, ..self }
    }

    /// Mark the summary as failed with a message.
    pub fn fail(self, msg: impl std::fmt::Display) -> Self {
        Self {
            status: Status::Fail(format!("{}", msg)),
            ..self
        }
    }

    /// Mark the summary as failed by `error`, keeping its kind.
    pub fn fail_with(self, error: &Error) -> Self {
        let status = match error {
            Error::Cancelled => Status::Cancelled,
            Error::VerificationMismatch { .. } => Status::HashMismatch(error.to_string()),
            _ => Status::Fail(report(error)),
        };
        Self {
            status,
            error_kind: Some(error.kind()),
            ..self
        }
    }

    /// Mark the summary as skipped with a message.
    pub fn skip(self, msg: impl std::fmt::Display) -> Self {
        Self {
            status: Status::Skipped(format!("{}", msg)),
            ..self
        }
    }

    /// Record the byte counts of the session.
    pub fn with_transfer(self, transferred: u64, resumed: u64, total: Option<u64>) -> Self {
        Self {
            transferred,
            resumed,
            total,
            ..self
        }
    }

    pub fn with_elapsed(self, elapsed: Duration) -> Self {
        Self { elapsed, ..self }
    }

    pub fn with_verification(self, verification: Verification) -> Self {
        Self {
            verification: Some(verification),
            ..self
        }
    }

    pub fn with_mode(self, mode: TransferMode) -> Self {
        Self {
            mode: Some(mode),
            ..self
        }
    }

    /// Get a reference to the summary's target.
    pub fn target(&self) -> &DownloadTarget {
        &self.target
    }

    /// Get a reference to the summary's status.
    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Success | Status::Skipped(_))
    }

    /// Kind of the error that ended the session, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Bytes fetched during this run.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Bytes carried over from an earlier run.
    pub fn resumed(&self) -> u64 {
        self.resumed
    }

    /// Size of the resource, when known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn verification(&self) -> Option<&Verification> {
        self.verification.as_ref()
    }

    pub fn mode(&self) -> Option<TransferMode> {
        self.mode
    }
}

/// Error message including its sources.
fn report(error: &Error) -> String {
    let mut msg = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
