//! Error types for the edgequake-pdf2csv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2CsvError`]: **Request-level**: the operation the caller asked for
//!   cannot be carried out (a batch contains a non-PDF, an identifier is
//!   unknown, the storage root is unusable). Returned as `Err(Pdf2CsvError)`
//!   from the public entry points.
//!
//! * [`JobError`]: **Per-file**: one upload could not be turned into tables
//!   (corrupt PDF, timeout, disk full) but its siblings are unaffected. The
//!   error is rendered into the job's failure reason and only surfaces when
//!   that job is retrieved.
//!
//! [`ExtractionFailure`] is what a [`crate::pipeline::extract::TableExtractor`]
//! returns; the orchestrator wraps it into [`JobError::ExtractionFailed`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All request-level errors returned by the edgequake-pdf2csv library.
///
/// Per-file failures use [`JobError`] and are recorded on the job rather
/// than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2CsvError {
    // ── Submission errors ─────────────────────────────────────────────────
    /// At least one file in the batch is not a PDF; nothing was accepted.
    #[error("All files should be PDFs; rejected: {}", rejected.join(", "))]
    NotAPdf { rejected: Vec<String> },

    /// The batch contained no files.
    #[error("No files selected for upload")]
    EmptyBatch,

    /// The batch holds more files than the service accepts at once.
    #[error("Batch of {count} files exceeds the limit of {max} files per upload")]
    BatchTooLarge { count: usize, max: usize },

    // ── Job errors ────────────────────────────────────────────────────────
    /// No job was ever issued under this identifier (or it was deleted).
    #[error("No job found for identifier '{id}'")]
    JobNotFound { id: String },

    /// The job finished in the `Failed` state.
    #[error("Job '{id}' failed: {reason}")]
    JobFailed { id: String, reason: String },

    /// A terminal job was asked to change state again.
    #[error("Job '{id}' already reached a terminal state")]
    JobAlreadyTerminal { id: String },

    /// The job is still being processed.
    #[error("Job '{id}' is still being processed")]
    JobInFlight { id: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// A published result file could not be read back.
    #[error("Failed to read result file '{path}': {source}")]
    ResultReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage root could not be created or is not a directory.
    #[error("Storage directory '{path}' is unusable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single uploaded file.
///
/// Stored on the job (as its failure reason) when processing fails. Other
/// files of the same batch keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobError {
    /// The table extractor rejected the document.
    #[error("Table extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    /// Extraction did not finish within the configured limit.
    #[error("Table extraction timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The job was cancelled through its handle.
    #[error("Job was cancelled before extraction finished")]
    Cancelled,

    /// Writing the result files failed; nothing was published.
    #[error("Failed to persist results: {detail}")]
    PersistenceFailed { detail: String },

    /// The extraction task panicked or was aborted by the runtime.
    #[error("Extraction task aborted: {detail}")]
    TaskPanicked { detail: String },
}

/// Failure reported by a table extractor for one document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct ExtractionFailure {
    pub detail: String,
}

impl ExtractionFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl From<ExtractionFailure> for JobError {
    fn from(e: ExtractionFailure) -> Self {
        JobError::ExtractionFailed { detail: e.detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_lists_rejected_files() {
        let e = Pdf2CsvError::NotAPdf {
            rejected: vec!["notes.pdf".into(), "readme.pdf".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.pdf, readme.pdf"), "got: {msg}");
    }

    #[test]
    fn batch_too_large_display() {
        let e = Pdf2CsvError::BatchTooLarge { count: 40, max: 32 };
        assert!(e.to_string().contains("40"));
        assert!(e.to_string().contains("32"));
    }

    #[test]
    fn extraction_failure_converts_to_job_error() {
        let e: JobError = ExtractionFailure::new("xref table is corrupt").into();
        assert_eq!(
            e,
            JobError::ExtractionFailed {
                detail: "xref table is corrupt".into()
            }
        );
        assert!(e.to_string().contains("xref table is corrupt"));
    }

    #[test]
    fn timeout_display() {
        let e = JobError::Timeout { secs: 90 };
        assert!(e.to_string().contains("90s"));
    }

    #[test]
    fn job_failed_display() {
        let e = Pdf2CsvError::JobFailed {
            id: "20260101_120000000001".into(),
            reason: "disk full".into(),
        };
        assert!(e.to_string().contains("20260101_120000000001"));
        assert!(e.to_string().contains("disk full"));
    }
}
