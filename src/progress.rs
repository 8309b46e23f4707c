//! Progress reporting for scan runs.
//!
//! Two channels leave the orchestrator while a job runs:
//!
//! * [`ScanProgressCallback`] — synchronous per-page events for the host
//!   (terminal progress bar, websocket, log line). Injected through
//!   [`crate::config::ScanConfigBuilder::progress_callback`].
//! * [`ProgressWriter`] — best-effort persistence of `progress_pages` to the
//!   job store. Page tasks never wait on the store: they push the current
//!   count into a bounded queue, and one background task drains it and writes
//!   only counts larger than the last one written. A full queue drops the
//!   update; the orchestrator writes the final count itself after
//!   [`ProgressWriter::finish`], so the stored value always ends correct.
//!
//! # Example
//!
//! ```rust
//! use trademark_scan::{ScanConfig, ScanProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ScanProgressCallback for Counter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, brand: Option<&str>) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total_pages}: {brand:?}");
//!     }
//! }
//!
//! let config = ScanConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::model::JobUpdate;
use crate::store::JobStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Called by the orchestrator as it processes pages.
///
/// Pages inside a batch run concurrently, so `on_page_complete` and
/// `on_page_error` may be called from several tasks at once. All methods
/// default to no-ops.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once the page count is known.
    fn on_scan_start(&self, job_id: &str, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// Called before each batch starts. `batch` is 1-indexed.
    fn on_batch_start(&self, batch: usize, total_batches: usize, first_page: usize, last_page: usize) {
        let _ = (batch, total_batches, first_page, last_page);
    }

    /// Called when a page finished without error. `brand` is `None` when the
    /// page carried no trademark.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, brand: Option<&str>) {
        let _ = (page_num, total_pages, brand);
    }

    /// Called when a page failed.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_scan_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScanConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

/// Non-blocking, single-writer progress persistence for one run.
pub struct ProgressWriter {
    tx: mpsc::Sender<usize>,
    task: JoinHandle<usize>,
}

impl ProgressWriter {
    /// Start the drain task for `job_id`.
    pub fn spawn(jobs: Arc<dyn JobStore>, job_id: String, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<usize>(capacity.max(1));
        let task = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(mut latest) = rx.recv().await {
                while let Ok(next) = rx.try_recv() {
                    latest = latest.max(next);
                }
                if latest <= written {
                    continue;
                }
                match jobs.update(&job_id, JobUpdate::progress(latest)).await {
                    Ok(()) => written = latest,
                    Err(e) => warn!(job_id = %job_id, "Progress update failed: {}", e),
                }
            }
            written
        });
        Self { tx, task }
    }

    /// Queue a progress count. Never waits; drops the update if the queue is full.
    pub fn report(&self, processed: usize) {
        if let Err(e) = self.tx.try_send(processed) {
            debug!("Progress update {} dropped: {}", processed, e);
        }
    }

    /// Close the queue and wait for the drain task. Returns the highest
    /// count it wrote.
    pub async fn finish(self) -> usize {
        let Self { tx, task } = self;
        drop(tx);
        match task.await {
            Ok(written) => written,
            Err(e) => {
                warn!("Progress writer task failed: {}", e);
                0
            }
        }
    }
}
