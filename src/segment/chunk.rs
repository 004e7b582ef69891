//! Per-chunk bookkeeping and the bounded retry schedule.

use super::ByteRange;

use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{Jitter, RetryDecision, RetryPolicy};
use std::time::{Duration, Instant, SystemTime};

/// Lifecycle of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// Retry configuration shared by chunks and the single-stream fallback.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Retries allowed after the first failed attempt.
    pub max_retries: u32,
    /// Shortest backoff between attempts.
    pub min_backoff: Duration,
    /// Longest backoff between attempts.
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetrySettings {
    /// Build the exponential backoff policy for these settings.
    ///
    /// Delays double from `min_backoff` up to `max_backoff`, without jitter.
    pub fn policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .jitter(Jitter::None)
            .retry_bounds(self.min_backoff, self.max_backoff.max(self.min_backoff))
            .build_with_max_retries(self.max_retries)
    }
}

/// Attempt counter driven by a [`RetryPolicy`].
///
/// Failure `k` is retried while `k <= max_retries`, so a budget of five
/// retries allows six attempts in total.
#[derive(Debug, Clone)]
pub struct RetryState {
    retries: u32,
    first_attempt: SystemTime,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            retries: 0,
            first_attempt: SystemTime::now(),
        }
    }

    /// Retries consumed so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Attempts made so far, the failing one included.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Register a failure; returns the delay before the next attempt or
    /// `None` once the budget is spent.
    pub fn next_delay(&mut self, policy: &impl RetryPolicy) -> Option<Duration> {
        match policy.should_retry(self.first_attempt, self.retries) {
            RetryDecision::Retry { execute_after } => {
                self.retries += 1;
                Some(
                    execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or_default(),
                )
            }
            RetryDecision::DoNotRetry => None,
        }
    }
}

/// One planned range and its transfer state.
///
/// A chunk is owned by exactly one worker while it is in progress; the queue
/// hands it out by value.
#[derive(Debug, Clone)]
pub struct ChunkState {
    pub range: ByteRange,
    pub status: ChunkStatus,
    pub bytes_written: u64,
    retry: RetryState,
    not_before: Option<Instant>,
}

impl ChunkState {
    pub fn new(range: ByteRange) -> Self {
        Self {
            range,
            status: ChunkStatus::Pending,
            bytes_written: 0,
            retry: RetryState::new(),
            not_before: None,
        }
    }

    /// Retries consumed so far.
    pub fn retry_count(&self) -> u32 {
        self.retry.retries()
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// Whether the chunk may be dispatched at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.status == ChunkStatus::Pending && self.not_before.map_or(true, |t| t <= now)
    }

    /// Earliest instant the chunk may be dispatched again.
    pub fn not_before(&self) -> Option<Instant> {
        self.not_before
    }

    pub fn begin(&mut self) {
        self.status = ChunkStatus::InProgress;
        self.bytes_written = 0;
    }

    pub fn complete(&mut self, written: u64) {
        self.status = ChunkStatus::Complete;
        self.bytes_written = written;
        self.not_before = None;
    }

    /// Register a failed attempt.
    ///
    /// Returns `true` when the chunk went back to `Pending` with a backoff,
    /// `false` when it is terminally `Failed`.
    pub fn fail(&mut self, policy: &impl RetryPolicy) -> bool {
        self.bytes_written = 0;
        match self.retry.next_delay(policy) {
            Some(delay) => {
                self.status = ChunkStatus::Pending;
                self.not_before = Some(Instant::now() + delay);
                true
            }
            None => {
                self.status = ChunkStatus::Failed;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(max_retries: u32) -> ExponentialBackoff {
        RetrySettings {
            max_retries,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
        .policy()
    }

    #[test]
    fn test_budget_allows_retries_plus_one_attempts() {
        let policy = fast(5);
        let mut chunk = ChunkState::new(ByteRange::new(40, 79));
        let mut failures = 0;
        loop {
            chunk.begin();
            failures += 1;
            if !chunk.fail(&policy) {
                break;
            }
        }
        assert_eq!(failures, 6);
        assert_eq!(chunk.attempts(), 6);
        assert_eq!(chunk.status, ChunkStatus::Failed);
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let mut chunk = ChunkState::new(ByteRange::new(0, 9));
        chunk.begin();
        assert!(!chunk.fail(&fast(0)));
        assert_eq!(chunk.attempts(), 1);
    }

    #[test]
    fn test_backoff_delays_readiness() {
        let policy = RetrySettings {
            max_retries: 1,
            min_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
        }
        .policy();
        let mut chunk = ChunkState::new(ByteRange::new(0, 9));
        assert!(chunk.is_ready(Instant::now()));
        chunk.begin();
        assert!(!chunk.is_ready(Instant::now()));
        assert!(chunk.fail(&policy));
        assert_eq!(chunk.status, ChunkStatus::Pending);
        assert_eq!(chunk.retry_count(), 1);
        assert!(chunk.not_before().is_some());
    }
}
