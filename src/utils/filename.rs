//! File names derived from URLs.

use reqwest::Url;

/// Name used when a URL path has no last segment.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Get the decoded last path segment of `url`, or [`DEFAULT_FILENAME`].
///
/// ```rust
/// use fastget::utils::filename_from_url;
/// use reqwest::Url;
///
/// let url = Url::parse("https://example.com/dir/my%20file.iso?x=1").unwrap();
/// assert_eq!(filename_from_url(&url), "my file.iso");
/// ```
pub fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let name: String = form_urlencoded::parse(segment.as_bytes())
        .map(|(key, val)| [key, val].concat())
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(url: &str) -> String {
        filename_from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(name("https://example.com/a/b/file.tar.gz"), "file.tar.gz");
    }

    #[test]
    fn test_percent_decoded() {
        assert_eq!(name("https://example.com/my%20file.zip"), "my file.zip");
    }

    #[test]
    fn test_default_when_empty() {
        assert_eq!(name("https://example.com/"), DEFAULT_FILENAME);
        assert_eq!(name("https://example.com/dir/"), DEFAULT_FILENAME);
        assert_eq!(name("https://example.com"), DEFAULT_FILENAME);
    }
}
