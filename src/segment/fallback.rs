//! Whole-resource transfer for servers without range support.

use super::{AttemptError, RetrySettings, RetryState};
use crate::error::{Error, Result, TransferError};
use crate::progress::ProgressTracker;

use futures::StreamExt;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Sequential download of the whole resource with one GET.
///
/// There is no resume in this mode: every attempt truncates the destination
/// and starts again from byte zero. A partial file left by an earlier run is
/// overwritten the same way.
pub struct SingleStreamFallback {
    client: ClientWithMiddleware,
    url: Url,
    destination: PathBuf,
    tracker: Arc<ProgressTracker>,
    attempt_timeout: Duration,
    retry: RetrySettings,
    cancel: CancellationToken,
}

impl SingleStreamFallback {
    pub fn new(
        client: ClientWithMiddleware,
        url: Url,
        destination: impl Into<PathBuf>,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            client,
            url,
            destination: destination.into(),
            tracker,
            attempt_timeout: Duration::from_secs(30),
            retry: RetrySettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Longest wait for the server within one attempt.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run attempts until one succeeds or the retries are spent.
    ///
    /// Returns the number of bytes written.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn run(&self) -> Result<u64> {
        let policy = self.retry.policy();
        let mut retry = RetryState::new();

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.attempt() => outcome,
            };

            let cause = match outcome {
                Ok(written) => {
                    debug!("Single stream complete, {} bytes", written);
                    return Ok(written);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(cause)) => cause,
            };

            match retry.next_delay(&policy) {
                Some(delay) => {
                    warn!(
                        "Single stream attempt {} failed: {}; restarting in {:?}",
                        retry.retries(),
                        cause,
                        delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    return Err(Error::WholeStreamTransferFailed {
                        attempts: retry.attempts(),
                        cause,
                    })
                }
            }
        }
    }

    async fn attempt(&self) -> std::result::Result<u64, AttemptError> {
        let timeout = self.attempt_timeout;
        let path = &self.destination;
        let storage = |e: std::io::Error| AttemptError::Fatal(Error::storage(path, e));

        let mut file = File::create(path).await.map_err(storage)?;
        self.tracker.reset();

        let response = tokio::time::timeout(timeout, self.client.get(self.url.clone()).send())
            .await
            .map_err(|_| TransferError::Timeout(timeout))?
            .map_err(TransferError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status(status).into());
        }

        let expected = response.content_length();
        self.tracker.set_total(expected);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(timeout, stream.next())
                .await
                .map_err(|_| TransferError::Timeout(timeout))?;
            let Some(item) = next else {
                break;
            };
            let mut bytes = item.map_err(TransferError::from)?;
            let n = bytes.len() as u64;
            file.write_all_buf(&mut bytes).await.map_err(storage)?;
            written += n;
            self.tracker.add(n);
        }

        if let Some(expected) = expected {
            if written != expected {
                return Err(TransferError::ShortBody {
                    expected,
                    received: written,
                }
                .into());
            }
        }

        file.flush().await.map_err(storage)?;
        file.sync_data().await.map_err(storage)?;
        Ok(written)
    }
}
