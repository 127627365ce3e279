//! Progress-callback trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to be told when
//! jobs are accepted, start extracting, and finish.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2csv::{JobProgressCallback, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, job_id: &str, table_count: usize) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{job_id}: {table_count} tables");
//!     }
//! }
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { finished: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as jobs move through their lifecycle.
///
/// Jobs run concurrently, so every method may be called from several
/// threads at once. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// A file passed validation and was issued `job_id`.
    fn on_job_accepted(&self, job_id: &str, filename: &str) {
        let _ = (job_id, filename);
    }

    /// The job obtained a worker slot and extraction is starting.
    fn on_extraction_start(&self, job_id: &str) {
        let _ = job_id;
    }

    /// The job finished successfully. `table_count` may be zero.
    fn on_job_complete(&self, job_id: &str, table_count: usize) {
        let _ = (job_id, table_count);
    }

    /// The job finished in the `Failed` state.
    fn on_job_failed(&self, job_id: &str, reason: &str) {
        let _ = (job_id, reason);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
