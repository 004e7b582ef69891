//! The persisted record of completed chunks.

use super::FileIdentity;
use crate::segment::ByteRange;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Record format version.
pub const MANIFEST_VERSION: u32 = 1;

/// First line of a resume record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub version: u32,
    pub url: String,
    pub destination: String,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Digest algorithm the finished file will be checked with.
    pub algorithm: String,
    pub file: FileIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// A loaded resume record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeManifest {
    pub name: String,
    pub header: ManifestHeader,
    pub completed: BTreeSet<ByteRange>,
}

impl ResumeManifest {
    /// Bytes covered by the completed ranges.
    pub fn completed_bytes(&self) -> u64 {
        self.completed.iter().map(ByteRange::len).sum()
    }
}

/// Why a record could not be read back.
#[derive(Debug)]
pub(crate) enum Corruption {
    Empty,
    Unterminated,
    Line(usize, serde_json::Error),
    Version(u32),
}

impl std::fmt::Display for Corruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Corruption::Empty => write!(f, "record is empty"),
            Corruption::Unterminated => write!(f, "last line is unterminated"),
            Corruption::Line(n, e) => write!(f, "line {n}: {e}"),
            Corruption::Version(v) => write!(f, "unknown version {v}"),
        }
    }
}

/// Parse a complete record. A torn or partial record is rejected as a whole.
pub(crate) fn parse(
    content: &str,
) -> std::result::Result<(ManifestHeader, BTreeSet<ByteRange>), Corruption> {
    if content.is_empty() {
        return Err(Corruption::Empty);
    }
    if !content.ends_with('\n') {
        return Err(Corruption::Unterminated);
    }

    let mut lines = content.lines().enumerate();
    let header: ManifestHeader = match lines.next() {
        Some((n, line)) => serde_json::from_str(line).map_err(|e| Corruption::Line(n + 1, e))?,
        None => return Err(Corruption::Empty),
    };
    if header.version != MANIFEST_VERSION {
        return Err(Corruption::Version(header.version));
    }

    let completed = lines
        .map(|(n, line)| serde_json::from_str::<ByteRange>(line).map_err(|e| Corruption::Line(n + 1, e)))
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;

    Ok((header, completed))
}

/// Serialize one record line, newline included.
pub(crate) fn line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}
