//! Byte ranges as they travel on the wire and in resume records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous span of a resource, both ends inclusive.
///
/// Inclusive bounds match the HTTP `Range` header. [`Display`](fmt::Display)
/// renders the half-open form `[start, end + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "empty byte range {start}-{end}");
        Self { start, end }
    }

    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// File offset the range is written at.
    pub fn offset(&self) -> u64 {
        self.start
    }

    /// A range always holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Whether this range spans a whole resource of `total_size` bytes.
    pub fn is_whole(&self, total_size: u64) -> bool {
        self.start == 0 && self.end + 1 == total_size
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_and_header() {
        let r = ByteRange::new(40, 79);
        assert_eq!(r.len(), 40);
        assert_eq!(r.header_value(), "bytes=40-79");
        assert_eq!(r.to_string(), "[40, 80)");
    }

    #[test]
    fn test_single_byte() {
        let r = ByteRange::new(7, 7);
        assert_eq!(r.len(), 1);
        assert!(!r.is_whole(8));
        assert!(ByteRange::new(0, 7).is_whole(8));
    }

    #[test]
    fn test_ordering_follows_offsets() {
        let mut v = vec![ByteRange::new(80, 99), ByteRange::new(0, 39), ByteRange::new(40, 79)];
        v.sort();
        assert_eq!(v[0].start, 0);
        assert_eq!(v[2].start, 80);
    }
}
