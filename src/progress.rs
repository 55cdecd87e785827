//! Progress-callback trait for download and per-page events.
//!
//! Inject an [`Arc<dyn WorkerProgressCallback>`] via
//! [`crate::config::WorkerConfigBuilder::progress_callback`] to receive
//! events as the worker stages documents and transforms pages.
//!
//! # Why callbacks instead of channels?
//!
//! The library does not know whether it runs under a terminal, a service
//! manager or a test harness. A callback lets the host forward events to a
//! progress bar or a metrics sink without the library depending on either.
//! The trait is `Send + Sync` because page events fire from concurrently
//! spawned page workers.

use std::sync::Arc;

/// Called by the worker as it downloads documents and processes pages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait WorkerProgressCallback: Send + Sync {
    /// Called once the download response headers arrive.
    ///
    /// # Arguments
    /// * `task_id`: task whose document is downloading
    /// * `total_bytes`: `Content-Length`, when the server sent one
    fn on_download_start(&self, task_id: i64, total_bytes: Option<u64>) {
        let _ = (task_id, total_bytes);
    }

    /// Called after each received chunk with the cumulative byte count.
    fn on_download_progress(&self, task_id: i64, downloaded: u64) {
        let _ = (task_id, downloaded);
    }

    /// Called once the document is fully written to the inbox.
    fn on_download_complete(&self, task_id: i64, bytes: u64) {
        let _ = (task_id, bytes);
    }

    /// Called when a page's text has been recognised.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: page count of the document
    /// * `text_len`: byte length of the recognised text
    fn on_page_complete(&self, task_id: i64, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (task_id, page_num, total_pages, text_len);
    }

    /// Called when a page fails to rasterise or recognise.
    fn on_page_error(&self, task_id: i64, page_num: usize, total_pages: usize, error: &str) {
        let _ = (task_id, page_num, total_pages, error);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl WorkerProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::WorkerConfig`].
pub type ProgressCallback = Arc<dyn WorkerProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        downloaded: AtomicU64,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl WorkerProgressCallback for TrackingCallback {
        fn on_download_progress(&self, _task_id: i64, downloaded: u64) {
            self.downloaded.store(downloaded, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _task_id: i64, _page: usize, _total: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _task_id: i64, _page: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_download_start(1, Some(10));
        cb.on_download_progress(1, 5);
        cb.on_download_complete(1, 10);
        cb.on_page_complete(1, 1, 2, 42);
        cb.on_page_error(1, 2, 2, "gs exited with 1");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_download_progress(9, 1024);
        tracker.on_download_progress(9, 4096);
        tracker.on_page_complete(9, 1, 3, 100);
        tracker.on_page_complete(9, 2, 3, 200);
        tracker.on_page_error(9, 3, 3, "recognize failed");

        assert_eq!(tracker.downloaded.load(Ordering::SeqCst), 4096);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_page_complete(1, 1, 1, 0);
    }
}
