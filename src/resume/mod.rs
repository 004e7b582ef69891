//! Persistence of per-download progress.
//!
//! A [`ResumeStore`] keeps one record per [`ResumeKey`]. Records are only
//! appended to while chunks complete and are removed once the download is
//! verified.

pub mod key;
pub mod manifest;
pub mod store;

pub use key::{FileIdentity, ResumeKey};
pub use manifest::{ManifestHeader, ResumeManifest, MANIFEST_VERSION};
pub use store::{ResumeStore, RECORD_EXTENSION};
