//! Task-safe hand-off of pending chunks between workers.

use super::{ByteRange, ChunkState};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Longest a worker sleeps before looking at the queue again.
pub const IDLE_POLL: Duration = Duration::from_millis(50);

/// Result of a non-blocking [`ChunkQueue::pop`].
#[derive(Debug)]
pub enum Pop {
    /// The chunk now belongs to the caller.
    Ready(ChunkState),
    /// Nothing is ready; look again after at most this long.
    Wait(Duration),
    /// Every chunk has completed.
    Drained,
}

/// Pending chunks plus a count of chunks not yet complete.
///
/// The count covers chunks in the queue and chunks held by workers. It only
/// drops through [`ChunkQueue::finish_one`], which callers invoke after the
/// completion is recorded.
#[derive(Debug)]
pub struct ChunkQueue {
    pending: Mutex<VecDeque<ChunkState>>,
    outstanding: AtomicUsize,
    notify: Notify,
}

impl ChunkQueue {
    pub fn new(ranges: impl IntoIterator<Item = ByteRange>) -> Self {
        let pending: VecDeque<_> = ranges.into_iter().map(ChunkState::new).collect();
        Self {
            outstanding: AtomicUsize::new(pending.len()),
            pending: Mutex::new(pending),
            notify: Notify::new(),
        }
    }

    /// Chunks not yet complete, in flight ones included.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Take the first chunk whose backoff has elapsed.
    pub fn pop(&self) -> Pop {
        if self.outstanding() == 0 {
            return Pop::Drained;
        }

        let now = Instant::now();
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(index) = pending.iter().position(|c| c.is_ready(now)) {
            if let Some(mut chunk) = pending.remove(index) {
                chunk.begin();
                return Pop::Ready(chunk);
            }
        }

        let wait = pending
            .iter()
            .filter_map(ChunkState::not_before)
            .min()
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or(IDLE_POLL);
        Pop::Wait(wait.min(IDLE_POLL))
    }

    /// Put a failed chunk back for another attempt.
    pub fn requeue(&self, chunk: ChunkState) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.push_back(chunk);
        drop(pending);
        self.notify.notify_waiters();
    }

    /// Release one completed chunk.
    pub fn finish_one(&self) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
        self.notify.notify_waiters();
    }

    /// Wait for a queue change, at most `timeout`.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::ChunkStatus;
    use crate::segment::RetrySettings;

    #[test]
    fn test_pop_hands_out_each_chunk_once() {
        let queue = ChunkQueue::new([ByteRange::new(0, 9), ByteRange::new(10, 19)]);
        let a = match queue.pop() {
            Pop::Ready(c) => c,
            other => panic!("expected a chunk, got {other:?}"),
        };
        let b = match queue.pop() {
            Pop::Ready(c) => c,
            other => panic!("expected a chunk, got {other:?}"),
        };
        assert_ne!(a.range, b.range);
        assert_eq!(a.status, ChunkStatus::InProgress);
        assert!(matches!(queue.pop(), Pop::Wait(_)));
        assert_eq!(queue.outstanding(), 2);

        queue.finish_one();
        queue.finish_one();
        assert!(matches!(queue.pop(), Pop::Drained));
    }

    #[test]
    fn test_backoff_is_respected() {
        let policy = RetrySettings {
            max_retries: 3,
            min_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30),
        }
        .policy();
        let queue = ChunkQueue::new([ByteRange::new(0, 9)]);
        let mut chunk = match queue.pop() {
            Pop::Ready(c) => c,
            other => panic!("expected a chunk, got {other:?}"),
        };
        assert!(chunk.fail(&policy));
        queue.requeue(chunk);

        match queue.pop() {
            Pop::Wait(d) => assert!(d <= IDLE_POLL),
            other => panic!("expected to wait, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_is_bounded() {
        let queue = ChunkQueue::new([ByteRange::new(0, 9)]);
        let started = Instant::now();
        queue.wait(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
