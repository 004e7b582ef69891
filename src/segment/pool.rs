//! Bounded pool of workers fetching chunks over ranged requests.

use super::queue::{ChunkQueue, Pop};
use super::{AttemptError, ByteRange, ChunkState, RetrySettings};
use crate::error::{Error, Result, TransferError};
use crate::progress::ProgressTracker;
use crate::resume::{ResumeKey, ResumeStore};
use crate::utils::content_length::response_content_range;

use futures::StreamExt;
use reqwest::header::{HeaderValue, IF_RANGE, RANGE};
use reqwest::{StatusCode, Url};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Downloads the pending chunks of one pre-sized destination file.
///
/// Up to `workers` tasks pull chunks from a shared queue. Each one writes its
/// chunk at the chunk's own offset, syncs it, records it in the
/// [`ResumeStore`] and only then releases it. A chunk that runs out of
/// retries stops the dispatch of further chunks; chunks already in flight
/// finish and are recorded. Cancelling the token aborts in-flight attempts
/// without recording them.
pub struct ConnectionWorkerPool {
    client: ClientWithMiddleware,
    url: Url,
    destination: PathBuf,
    total_size: u64,
    store: Arc<ResumeStore>,
    key: ResumeKey,
    tracker: Arc<ProgressTracker>,
    workers: usize,
    attempt_timeout: Duration,
    retry: RetrySettings,
    if_range: Option<HeaderValue>,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

struct Shared {
    client: ClientWithMiddleware,
    url: Url,
    destination: PathBuf,
    total_size: u64,
    store: Arc<ResumeStore>,
    key: ResumeKey,
    tracker: Arc<ProgressTracker>,
    attempt_timeout: Duration,
    policy: ExponentialBackoff,
    if_range: Option<HeaderValue>,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
    halt: CancellationToken,
    failure: Mutex<Option<Error>>,
}

impl Shared {
    /// Keep the first fatal error and stop dispatching.
    fn fail(&self, error: Error) {
        let mut slot = match self.failure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(error);
        }
        self.halt.cancel();
    }

    fn take_failure(&self) -> Option<Error> {
        match self.failure.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl ConnectionWorkerPool {
    pub fn new(
        client: ClientWithMiddleware,
        url: Url,
        destination: impl Into<PathBuf>,
        total_size: u64,
        store: Arc<ResumeStore>,
        key: ResumeKey,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            client,
            url,
            destination: destination.into(),
            total_size,
            store,
            key,
            tracker,
            workers: 1,
            attempt_timeout: Duration::from_secs(30),
            retry: RetrySettings::default(),
            if_range: None,
            limiter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of concurrent workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
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

    /// Validator sent as `If-Range` so a changed resource is never mixed in.
    pub fn if_range(mut self, validator: Option<&str>) -> Self {
        self.if_range = validator.and_then(|v| HeaderValue::from_str(v).ok());
        self
    }

    /// Semaphore shared with other pools to cap connections globally.
    pub fn limiter(mut self, limiter: Option<Arc<Semaphore>>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fetch `ranges` and return once every one of them is recorded.
    #[instrument(skip_all, fields(url = %self.url, chunks = ranges.len()))]
    pub async fn run(self, ranges: Vec<ByteRange>) -> Result<()> {
        if ranges.is_empty() {
            return Ok(());
        }

        let workers = self.workers.min(ranges.len());
        let queue = Arc::new(ChunkQueue::new(ranges));
        let shared = Arc::new(Shared {
            halt: self.cancel.child_token(),
            client: self.client,
            url: self.url,
            destination: self.destination,
            total_size: self.total_size,
            store: self.store,
            key: self.key,
            tracker: self.tracker,
            attempt_timeout: self.attempt_timeout,
            policy: self.retry.policy(),
            if_range: self.if_range,
            limiter: self.limiter,
            cancel: self.cancel,
            failure: Mutex::new(None),
        });

        debug!("Starting {} workers", workers);
        let mut set = JoinSet::new();
        for id in 0..workers {
            set.spawn(work(id, shared.clone(), queue.clone()));
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                shared.fail(Error::Internal(format!("worker task failed: {e}")));
            }
        }

        if shared.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(error) = shared.take_failure() {
            return Err(error);
        }
        match queue.outstanding() {
            0 => Ok(()),
            n => Err(Error::Internal(format!(
                "workers stopped with {n} chunks outstanding"
            ))),
        }
    }
}

enum Outcome {
    Aborted,
    Finished(std::result::Result<(), AttemptError>),
}

async fn work(id: usize, shared: Arc<Shared>, queue: Arc<ChunkQueue>) {
    loop {
        if shared.halt.is_cancelled() {
            break;
        }

        let mut chunk: ChunkState = match queue.pop() {
            Pop::Drained => break,
            Pop::Wait(delay) => {
                tokio::select! {
                    _ = shared.halt.cancelled() => break,
                    _ = queue.wait(delay) => continue,
                }
            }
            Pop::Ready(chunk) => chunk,
        };

        let _permit = match shared.limiter.clone() {
            Some(limiter) => tokio::select! {
                _ = shared.halt.cancelled() => break,
                permit = limiter.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        shared.fail(Error::Internal("connection limiter closed".into()));
                        break;
                    }
                },
            },
            None => None,
        };

        debug!("Worker {} fetching chunk {}", id, chunk.range);
        shared.tracker.chunk_started();
        let mut counted = 0u64;
        let outcome = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => Outcome::Aborted,
            result = fetch(&shared, chunk.range, &mut counted) => Outcome::Finished(result),
        };
        shared.tracker.chunk_finished();

        match outcome {
            Outcome::Aborted => {
                shared.tracker.rewind(counted);
                debug!("Worker {} aborted chunk {}", id, chunk.range);
                break;
            }
            Outcome::Finished(Ok(())) => {
                if let Err(e) = shared.store.record_complete(&shared.key, chunk.range).await {
                    shared.fail(e);
                    break;
                }
                chunk.complete(counted);
                queue.finish_one();
                debug!("Chunk {} complete", chunk.range);
            }
            Outcome::Finished(Err(AttemptError::Fatal(e))) => {
                shared.tracker.rewind(counted);
                shared.fail(e);
                break;
            }
            Outcome::Finished(Err(AttemptError::Transient(cause))) => {
                shared.tracker.rewind(counted);
                if chunk.fail(&shared.policy) {
                    warn!(
                        "Chunk {} attempt {} failed: {}; retrying",
                        chunk.range,
                        chunk.retry_count(),
                        cause
                    );
                    queue.requeue(chunk);
                } else {
                    warn!("Chunk {} exhausted its retries: {}", chunk.range, cause);
                    shared.fail(Error::ChunkTransferFailed {
                        range: chunk.range,
                        attempts: chunk.attempts(),
                        cause,
                    });
                    break;
                }
            }
        }
    }
}

/// One ranged GET for `range`, streamed to its offset.
async fn fetch(
    shared: &Shared,
    range: ByteRange,
    counted: &mut u64,
) -> std::result::Result<(), AttemptError> {
    let timeout = shared.attempt_timeout;

    let mut request = shared
        .client
        .get(shared.url.clone())
        .header(RANGE, range.header_value());
    if let Some(ref validator) = shared.if_range {
        request = request.header(IF_RANGE, validator.clone());
    }

    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| TransferError::Timeout(timeout))?
        .map_err(TransferError::from)?;

    let status = response.status();
    match status {
        StatusCode::PARTIAL_CONTENT => {
            let served = response_content_range(&response)
                .ok_or_else(|| TransferError::ContentRange("missing".into()))?;
            if served.start != range.start || served.end != range.end {
                return Err(TransferError::ContentRange(format!(
                    "bytes {}-{}",
                    served.start, served.end
                ))
                .into());
            }
        }
        StatusCode::OK if range.is_whole(shared.total_size) => {}
        _ => return Err(TransferError::Status(status).into()),
    }

    let path = &shared.destination;
    let storage = |e: std::io::Error| AttemptError::Fatal(Error::storage(path, e));

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(storage)?;
    file.seek(SeekFrom::Start(range.offset()))
        .await
        .map_err(storage)?;

    let mut remaining = range.len();
    let mut stream = response.bytes_stream();
    while remaining > 0 {
        let next = tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| TransferError::Timeout(timeout))?;
        let Some(item) = next else {
            break;
        };
        let mut bytes = item.map_err(TransferError::from)?;
        // Anything past the requested span is dropped.
        if bytes.len() as u64 > remaining {
            bytes.truncate(remaining as usize);
        }
        let n = bytes.len() as u64;
        file.write_all_buf(&mut bytes).await.map_err(storage)?;
        remaining -= n;
        *counted += n;
        shared.tracker.add(n);
    }

    if remaining > 0 {
        return Err(TransferError::ShortBody {
            expected: range.len(),
            received: range.len() - remaining,
        }
        .into());
    }

    file.flush().await.map_err(storage)?;
    file.sync_data().await.map_err(storage)?;
    Ok(())
}
