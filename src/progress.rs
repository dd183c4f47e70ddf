//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! real-time events as the orchestrator works through the queue.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a terminal progress bar, a log aggregator, or a
//! notification endpoint without the library knowing anything about how the
//! host application communicates. The trait is `Send + Sync` so it works
//! correctly when files are processed concurrently across the worker pool.

use crate::output::ProcessingResult;
use std::sync::Arc;

/// Called by the orchestrator as files move through the pipeline.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// In parallel mode `on_file_start` and `on_file_complete` may be called
/// concurrently from different workers. Implementations must protect shared
/// mutable state with appropriate synchronisation primitives.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after input discovery, before any file is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a worker picks up a file.
    fn on_file_start(&self, filename: &str) {
        let _ = filename;
    }

    /// Called when a file reaches a terminal state, successful or not.
    /// The result has already been persisted to the status table.
    fn on_file_complete(&self, result: &ProcessingResult) {
        let _ = result;
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, converted: usize) {
        let _ = (total_files, converted);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        converted: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_file_start(&self, _filename: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _result: &ProcessingResult) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, converted: usize) {
            self.converted.store(converted, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_file_start("a.pdf");
        cb.on_file_complete(&ProcessingResult::new("a.pdf"));
        cb.on_batch_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            converted: AtomicUsize::new(0),
        };

        tracker.on_batch_start(2);
        tracker.on_file_start("a.pdf");
        tracker.on_file_complete(&ProcessingResult::new("a.pdf"));
        tracker.on_file_start("b.pdf");
        tracker.on_file_complete(&ProcessingResult::new("b.pdf"));
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.converted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
    }
}
