//! Download module containing download-related functionality.
//!
//! - [`target`] - The [`DownloadTarget`] and URL handling
//! - [`summary`] - Download result tracking and status reporting
//! - [`hash`] - File integrity verification

pub mod hash;
pub mod summary;
pub mod target;

pub use hash::{compute_digest, verify, ExpectedHash, HashAlgorithm, Verification};
pub use summary::{Status, Summary, TransferMode};
pub use target::DownloadTarget;
