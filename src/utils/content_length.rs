//! Content length extraction utilities.
//!
//! This module reads the size information servers attach to responses,
//! from either the Content-Range header of a 206 answer or the
//! Content-Length header of a plain 200.

use reqwest::header::CONTENT_RANGE;
use reqwest::Response;

/// A parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` when the server sent `*` as the complete length.
    pub total: Option<u64>,
}

/// Parse a Content-Range header value.
///
/// # Example
///
/// ```rust
/// use fastget::utils::parse_content_range;
///
/// let range = parse_content_range("bytes 0-1023/2048").unwrap();
/// assert_eq!((range.start, range.end, range.total), (0, 1023, Some(2048)));
/// ```
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        n => {
            let total = n.parse::<u64>().ok()?;
            if end >= total {
                return None;
            }
            Some(total)
        }
    };
    Some(ContentRange { start, end, total })
}

/// Parse Content-Range header to extract total size.
///
/// Returns `None` for unparsable headers and for an unknown (`*`) total.
pub fn parse_content_range_total(content_range: &str) -> Option<u64> {
    parse_content_range(content_range).and_then(|r| r.total)
}

/// Read the Content-Range header of a response.
pub fn response_content_range(response: &Response) -> Option<ContentRange> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Total size of the resource behind a response.
///
/// A 206 answer carries it in Content-Range; anything else is read from
/// Content-Length.
pub fn get_content_length(response: &Response) -> Option<u64> {
    match response_content_range(response) {
        Some(range) => range.total,
        None => response.content_length(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-1023/2048"), Some(2048));
        assert_eq!(parse_content_range_total("bytes 200-1023/5000"), Some(5000));
        assert_eq!(parse_content_range_total("bytes 0-0/1"), Some(1));
        assert_eq!(parse_content_range_total("invalid"), None);
        assert_eq!(parse_content_range_total("bytes 0-1023"), None);
        assert_eq!(parse_content_range_total(""), None);
    }

    #[test]
    fn test_parse_content_range_edge_cases() {
        assert_eq!(parse_content_range_total("bytes 0-1023/ 2048 "), Some(2048));
        assert_eq!(
            parse_content_range_total("bytes 0-1023/999999999999"),
            Some(999999999999)
        );
        // End beyond the total is malformed.
        assert_eq!(parse_content_range("bytes 0-0/0"), None);
        assert_eq!(parse_content_range("bytes 9-3/20"), None);
    }

    #[test]
    fn test_unknown_total() {
        let range = parse_content_range("bytes 0-0/*").unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 0);
        assert_eq!(range.total, None);
    }

    #[test]
    fn test_span() {
        let range = parse_content_range("bytes 40-79/100").unwrap();
        assert_eq!(
            range,
            ContentRange {
                start: 40,
                end: 79,
                total: Some(100)
            }
        );
    }
}
