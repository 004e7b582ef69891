//! Content verification of finished downloads.
//!
//! Two digest algorithms are supported:
//!
//! - **SHA-256**: 64 hexadecimal characters
//! - **MD5**: 32 hexadecimal characters
//!
//! Digests are compared case-insensitively. A mismatch is reported as
//! [`Verification::Mismatch`]; the file is never removed here, that decision
//! belongs to the caller.
//!
//! # Examples
//!
//! ```rust
//! use fastget::download::hash::{ExpectedHash, HashAlgorithm};
//!
//! let expected = ExpectedHash::parse("D41D8CD98F00B204E9800998ECF8427E", None).unwrap();
//! assert_eq!(expected.algorithm, HashAlgorithm::Md5);
//! assert_eq!(expected.digest, "d41d8cd98f00b204e9800998ecf8427e");
//! ```

use crate::error::{Error, Result};

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const READ_BUFFER: usize = 64 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Md5,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Length of the hex encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Md5 => 32,
        }
    }

    /// Guess the algorithm from the length of a hex digest.
    ///
    /// ```
    /// use fastget::download::hash::HashAlgorithm;
    ///
    /// assert_eq!(HashAlgorithm::detect("400a0698b5b8a84fc57ad96e0c3b57c3"), Some(HashAlgorithm::Md5));
    /// assert_eq!(HashAlgorithm::detect("invalid_hash"), None);
    /// ```
    pub fn detect(digest: &str) -> Option<Self> {
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match digest.len() {
            64 => Some(HashAlgorithm::Sha256),
            32 => Some(HashAlgorithm::Md5),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(Error::InvalidConfig(format!(
                "unsupported hash algorithm {other:?}"
            ))),
        }
    }
}

/// A digest the downloaded file must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

impl ExpectedHash {
    /// Parse a hex digest, detecting the algorithm from its length when
    /// none is given.
    pub fn parse(digest: &str, algorithm: Option<HashAlgorithm>) -> Result<Self> {
        let digest = digest.trim().to_ascii_lowercase();
        let algorithm = match algorithm {
            Some(algorithm) => algorithm,
            None => HashAlgorithm::detect(&digest).ok_or_else(|| {
                Error::InvalidConfig(format!("cannot tell the algorithm of digest {digest:?}"))
            })?,
        };
        if digest.len() != algorithm.hex_len() || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::InvalidConfig(format!(
                "{digest:?} is not a {algorithm} digest"
            )));
        }
        Ok(Self { algorithm, digest })
    }
}

/// Outcome of verifying a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// No digest was expected.
    Skipped,
    /// The digest matched; holds it.
    Matched(String),
    /// The bytes arrived but are not the expected ones.
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Verification::Mismatch { .. })
    }
}

enum Hasher {
    Sha256(Sha256),
    Md5(md5::Context),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Md5(h) => h.consume(data),
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => format!("{:x}", h.compute()),
        }
    }
}

fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::storage(path, e))?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER];

    loop {
        let n = file.read(&mut buffer).map_err(|e| Error::storage(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finish())
}

/// Stream a file once through `algorithm` on a blocking thread.
pub async fn compute_digest(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || digest_file(&path, algorithm))
        .await
        .map_err(|e| Error::Internal(format!("digest task failed: {e}")))?
}

/// Verify the file at `path` against `expected`.
pub async fn verify(path: &Path, expected: Option<&ExpectedHash>) -> Result<Verification> {
    let Some(expected) = expected else {
        return Ok(Verification::Skipped);
    };

    let actual = compute_digest(path, expected.algorithm).await?;
    debug!("{} of {:?} is {}", expected.algorithm, path, actual);

    if actual.eq_ignore_ascii_case(&expected.digest) {
        Ok(Verification::Matched(actual))
    } else {
        Ok(Verification::Mismatch {
            expected: expected.digest.clone(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_detect_by_length() {
        assert_eq!(HashAlgorithm::detect(EMPTY_MD5), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::detect(EMPTY_SHA256), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::detect("1127497"), None);
        assert_eq!(HashAlgorithm::detect(&"g".repeat(32)), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(ExpectedHash::parse(EMPTY_MD5, Some(HashAlgorithm::Sha256)).is_err());
        assert!(ExpectedHash::parse("abc", None).is_err());
    }

    #[tokio::test]
    async fn test_verify_skipped_without_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(verify(&path, None).await.unwrap(), Verification::Skipped);
    }

    #[tokio::test]
    async fn test_verify_sha256_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();

        let expected = ExpectedHash {
            algorithm: HashAlgorithm::Sha256,
            digest: ABC_SHA256.to_uppercase(),
        };
        assert_eq!(
            verify(&path, Some(&expected)).await.unwrap(),
            Verification::Matched(ABC_SHA256.to_string())
        );
    }

    #[tokio::test]
    async fn test_verify_md5_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"abc").unwrap();

        let expected = ExpectedHash::parse(EMPTY_MD5, None).unwrap();
        let outcome = verify(&path, Some(&expected)).await.unwrap();
        assert!(outcome.is_mismatch());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_digest_of_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            compute_digest(&path, HashAlgorithm::Md5).await.unwrap(),
            EMPTY_MD5
        );
        assert_eq!(
            compute_digest(&path, HashAlgorithm::Sha256).await.unwrap(),
            EMPTY_SHA256
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_storage_error() {
        let expected = ExpectedHash::parse(EMPTY_MD5, None).unwrap();
        let err = verify(Path::new("/nonexistent/fastget"), Some(&expected))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageFailed);
    }
}
