//! Discovery of resource size and range support.

use crate::error::{Error, Result};
use crate::segment::{RetrySettings, RetryState};
use crate::utils::content_length::response_content_range;

use reqwest::header::{HeaderMap, ETAG, LAST_MODIFIED, RANGE};
use reqwest::{StatusCode, Url};
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// What a server told us about a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether ranged requests can be used. Always false when the size is unknown.
    pub supports_ranges: bool,
    pub total_size: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Capabilities {
    /// Strongest validator to send as `If-Range`.
    ///
    /// Weak ETags are not allowed in `If-Range`, Last-Modified is used then.
    pub fn validator(&self) -> Option<&str> {
        match self.etag.as_deref() {
            Some(etag) if !etag.starts_with("W/") => Some(etag),
            _ => self.last_modified.as_deref(),
        }
    }
}

/// Issues a one-byte ranged GET to learn about a resource.
///
/// A `206` answer means ranges are honored and carries the size in
/// Content-Range. A `200` means they are not; the size then comes from
/// Content-Length, if any. The body is never read.
#[derive(Debug, Clone)]
pub struct RangeProbe {
    client: ClientWithMiddleware,
    timeout: Duration,
}

impl RangeProbe {
    pub fn new(client: ClientWithMiddleware, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn probe(&self, url: &Url) -> Result<Capabilities> {
        let fail = |reason: String| Error::ProbeFailed {
            url: url.to_string(),
            reason,
        };

        let request = self.client.get(url.clone()).header(RANGE, "bytes=0-0");
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| fail(format!("no response within {:?}", self.timeout)))?
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);

        let capabilities = match status {
            StatusCode::PARTIAL_CONTENT => {
                let total_size = response_content_range(&response).and_then(|r| r.total);
                Capabilities {
                    supports_ranges: total_size.is_some_and(|n| n > 0),
                    total_size,
                    etag,
                    last_modified,
                }
            }
            StatusCode::OK => Capabilities {
                supports_ranges: false,
                total_size: response.content_length(),
                etag,
                last_modified,
            },
            other => return Err(fail(format!("unexpected status {other}"))),
        };

        debug!(
            "Probe: ranges {}, size {:?}",
            capabilities.supports_ranges, capabilities.total_size
        );
        Ok(capabilities)
    }

    /// Probe, retrying `retries` more times with backoff.
    pub async fn probe_with_retries(
        &self,
        url: &Url,
        retries: u32,
        backoff: &RetrySettings,
    ) -> Result<Capabilities> {
        let policy = RetrySettings {
            max_retries: retries,
            ..backoff.clone()
        }
        .policy();
        let mut state = RetryState::new();

        loop {
            match self.probe(url).await {
                Ok(capabilities) => return Ok(capabilities),
                Err(e) => match state.next_delay(&policy) {
                    Some(delay) => {
                        warn!("{}; probing again in {:?}", e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_prefers_strong_etag() {
        let caps = Capabilities {
            etag: Some("\"v1\"".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            ..Capabilities::default()
        };
        assert_eq!(caps.validator(), Some("\"v1\""));
    }

    #[test]
    fn test_validator_skips_weak_etag() {
        let caps = Capabilities {
            etag: Some("W/\"v1\"".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            ..Capabilities::default()
        };
        assert_eq!(caps.validator(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));

        let caps = Capabilities {
            etag: Some("W/\"v1\"".into()),
            ..Capabilities::default()
        };
        assert_eq!(caps.validator(), None);
    }
}
