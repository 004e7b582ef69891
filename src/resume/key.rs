//! Stable identifiers for resume records.

use crate::error::{Error, Result};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Identity of the file a record was written against.
///
/// Deleting or replacing the destination yields a different identity, so a
/// record never applies to a file it was not written for. Inode numbers are
/// reused as soon as a file is deleted, so the birth time is part of the
/// identity where the filesystem reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
    /// Birth time in nanoseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
}

fn birth_time(metadata: &Metadata) -> Option<u64> {
    metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
            created: birth_time(metadata),
        }
    }

    #[cfg(not(unix))]
    pub fn of(metadata: &Metadata) -> Self {
        Self {
            device: 0,
            inode: 0,
            created: birth_time(metadata),
        }
    }

    /// Identity of the file at `path`, `None` when it does not exist.
    pub async fn probe(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Some(Self::of(&metadata))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(path, e)),
        }
    }
}

/// Identifies one (URL, destination) download across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeKey {
    name: String,
    destination: PathBuf,
    file: Option<FileIdentity>,
}

impl ResumeKey {
    /// Derive the key for `url` downloaded to `destination`.
    ///
    /// The name only depends on the URL and the absolute destination path.
    /// The file identity is read from disk at call time.
    pub async fn derive(url: &Url, destination: &Path) -> Result<Self> {
        let destination =
            std::path::absolute(destination).map_err(|e| Error::storage(destination, e))?;

        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(destination.as_os_str().as_encoded_bytes());
        let name = hex::encode(hasher.finalize());

        let file = FileIdentity::probe(&destination).await?;
        Ok(Self {
            name,
            destination,
            file,
        })
    }

    /// Hex name of the record, stable across runs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute destination path.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Identity of the destination when the key was derived.
    pub fn file(&self) -> Option<FileIdentity> {
        self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_name_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("https://example.com/a.bin").unwrap();
        let dest = dir.path().join("a.bin");

        let a = ResumeKey::derive(&url, &dest).await.unwrap();
        let b = ResumeKey::derive(&url, &dest).await.unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.name().len(), 64);
        assert!(a.file().is_none());
    }

    #[tokio::test]
    async fn test_name_depends_on_url_and_destination() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("https://example.com/a.bin").unwrap();
        let other = Url::parse("https://example.com/b.bin").unwrap();

        let a = ResumeKey::derive(&url, &dir.path().join("a.bin")).await.unwrap();
        let b = ResumeKey::derive(&other, &dir.path().join("a.bin")).await.unwrap();
        let c = ResumeKey::derive(&url, &dir.path().join("c.bin")).await.unwrap();
        assert_ne!(a.name(), b.name());
        assert_ne!(a.name(), c.name());
    }

    #[tokio::test]
    async fn test_identity_follows_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("https://example.com/a.bin").unwrap();
        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, b"first").unwrap();
        let before = ResumeKey::derive(&url, &dest).await.unwrap();

        let replacement = dir.path().join("a.bin.new");
        std::fs::write(&replacement, b"second").unwrap();
        std::fs::rename(&replacement, &dest).unwrap();
        let after = ResumeKey::derive(&url, &dest).await.unwrap();

        assert_eq!(before.name(), after.name());
        assert!(before.file().is_some());
        assert_ne!(before.file(), after.file());
    }

    #[tokio::test]
    async fn test_identity_changes_when_file_is_deleted_and_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse("https://example.com/a.bin").unwrap();
        let dest = dir.path().join("a.bin");
        std::fs::write(&dest, vec![1u8; 100]).unwrap();
        if std::fs::metadata(&dest).unwrap().created().is_err() {
            // No birth time on this filesystem.
            return;
        }
        let before = ResumeKey::derive(&url, &dest).await.unwrap();

        std::fs::remove_file(&dest).unwrap();
        // Birth times come from a coarse clock.
        std::thread::sleep(std::time::Duration::from_millis(30));
        std::fs::write(&dest, vec![0xAAu8; 100]).unwrap();
        let after = ResumeKey::derive(&url, &dest).await.unwrap();

        assert_eq!(before.name(), after.name());
        assert!(after.file().unwrap().created.is_some());
        assert_ne!(before.file(), after.file());
    }
}
