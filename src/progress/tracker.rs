//! Lock-free progress accounting shared by the workers of one download.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot delivered to progress callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub destination: PathBuf,
    /// Bytes on disk so far, resumed bytes included.
    pub transferred: u64,
    /// Size of the resource, when known.
    pub total: Option<u64>,
    /// Chunks currently in flight.
    pub active_chunks: usize,
}

/// Callback receiving [`ProgressEvent`]s.
pub type ProgressCallback = Arc<Box<dyn Fn(&ProgressEvent) + Send + Sync>>;

/// Atomic byte and chunk counters for one destination.
pub struct ProgressTracker {
    destination: PathBuf,
    transferred: AtomicU64,
    resumed: AtomicU64,
    total: AtomicU64,
    active: AtomicUsize,
    callback: Option<ProgressCallback>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("destination", &self.destination)
            .field("transferred", &self.transferred())
            .field("total", &self.total())
            .finish()
    }
}

impl ProgressTracker {
    pub fn new(destination: impl Into<PathBuf>, callback: Option<ProgressCallback>) -> Self {
        Self {
            destination: destination.into(),
            transferred: AtomicU64::new(0),
            resumed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            callback,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Set the resource size. Zero means unknown.
    pub fn set_total(&self, total: Option<u64>) {
        self.total.store(total.unwrap_or(0), Ordering::Relaxed);
        self.emit();
    }

    pub fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    /// Start counting from bytes already on disk.
    pub fn resume_from(&self, bytes: u64) {
        self.resumed.store(bytes, Ordering::Relaxed);
        self.transferred.store(bytes, Ordering::Relaxed);
        self.emit();
    }

    /// Bytes on disk, resumed bytes included.
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Bytes carried over from an earlier run.
    pub fn resumed(&self) -> u64 {
        self.resumed.load(Ordering::Relaxed)
    }

    /// Bytes fetched during this run.
    pub fn fetched(&self) -> u64 {
        self.transferred().saturating_sub(self.resumed())
    }

    pub fn active_chunks(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn add(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
        self.emit();
    }

    /// Take back the bytes of an attempt that will be repeated.
    pub fn rewind(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let _ = self
            .transferred
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(bytes))
            });
        self.emit();
    }

    /// Drop everything counted so far, resumed bytes included.
    pub fn reset(&self) {
        self.resumed.store(0, Ordering::Relaxed);
        self.transferred.store(0, Ordering::Relaxed);
        self.emit();
    }

    pub fn chunk_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.emit();
    }

    pub fn chunk_finished(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
        self.emit();
    }

    /// Current counters.
    pub fn snapshot(&self) -> ProgressEvent {
        ProgressEvent {
            destination: self.destination.clone(),
            transferred: self.transferred(),
            total: self.total(),
            active_chunks: self.active_chunks(),
        }
    }

    fn emit(&self) {
        if let Some(ref callback) = self.callback {
            callback(&self.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_counters() {
        let tracker = ProgressTracker::new("/tmp/x", None);
        tracker.set_total(Some(100));
        tracker.resume_from(40);
        tracker.add(30);
        tracker.rewind(10);
        assert_eq!(tracker.transferred(), 60);
        assert_eq!(tracker.resumed(), 40);
        assert_eq!(tracker.fetched(), 20);
        assert_eq!(tracker.total(), Some(100));

        tracker.reset();
        assert_eq!(tracker.transferred(), 0);
        assert_eq!(tracker.fetched(), 0);
    }

    #[test]
    fn test_active_chunks_never_underflow() {
        let tracker = ProgressTracker::new("/tmp/x", None);
        tracker.chunk_started();
        tracker.chunk_finished();
        tracker.chunk_finished();
        assert_eq!(tracker.active_chunks(), 0);
    }

    #[test]
    fn test_concurrent_adds() {
        let tracker = Arc::new(ProgressTracker::new("/tmp/x", None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.add(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.transferred(), 8000);
    }

    #[test]
    fn test_callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(Box::new(move |e: &ProgressEvent| {
            sink.lock().unwrap().push(e.clone());
        }));
        let tracker = ProgressTracker::new("/tmp/x", Some(callback));
        tracker.set_total(Some(10));
        tracker.chunk_started();
        tracker.add(10);

        let events = seen.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.transferred, 10);
        assert_eq!(last.total, Some(10));
        assert_eq!(last.active_chunks, 1);
    }
}
