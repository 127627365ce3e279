//! Configuration types for the upload-to-CSV pipeline.
//!
//! Every knob of the service lives in [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. The orchestrator, the retrieval service and the
//! HTTP adapter all read from the same struct, so one value describes a
//! complete deployment.

use crate::error::Pdf2CsvError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the extraction service.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2csv::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .storage_dir("/var/lib/pdf2csv")
///     .concurrency(8)
///     .extraction_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Root directory under which each job's artifacts are published as
    /// `<storage_dir>/<job id>/`. Default: `uploads/csv`.
    pub storage_dir: PathBuf,

    /// Maximum number of documents extracted at the same time. Default: 4.
    ///
    /// This bounds the PDF engine's work and memory, not the uploads: every
    /// accepted job owns its PDF bytes from `submit` onward, including jobs
    /// still waiting in `Extracting` for a slot. Peak upload memory is
    /// therefore bounded per request by `max_upload_bytes`, not across
    /// requests; put a limit in front of the service if many large batches
    /// can arrive at once.
    pub concurrency: usize,

    /// Per-document extraction limit in seconds, counted from the moment the
    /// job obtains a worker slot. Default: 120.
    pub extraction_timeout_secs: u64,

    /// How long a retrieval blocks on an in-flight job before answering
    /// "processing". Default: 30. Zero means never block.
    pub retrieval_wait_secs: u64,

    /// Maximum number of files accepted in one submission. Default: 32.
    pub max_files_per_batch: usize,

    /// Maximum request body size accepted by the HTTP adapter. Default: 100 MiB.
    pub max_upload_bytes: usize,

    /// Field delimiter for the CSV output. Default: `b','`.
    pub delimiter: u8,

    /// How table headers are decided. Default: [`HeaderPolicy::Extractor`].
    pub header_policy: HeaderPolicy,

    /// Normalise cell contents before packaging. Default: false, so the
    /// CSV holds the extractor's grid unchanged.
    ///
    /// Cleanup never adds or removes rows, columns or tables. See
    /// [`crate::pipeline::clean`] for the rules applied.
    pub clean_cells: bool,

    /// Optional observer for job lifecycle events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("uploads").join("csv"),
            concurrency: 4,
            extraction_timeout_secs: 120,
            retrieval_wait_secs: 30,
            max_files_per_batch: 32,
            max_upload_bytes: 100 * 1024 * 1024,
            delimiter: b',',
            header_policy: HeaderPolicy::default(),
            clean_cells: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("storage_dir", &self.storage_dir)
            .field("concurrency", &self.concurrency)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("retrieval_wait_secs", &self.retrieval_wait_secs)
            .field("max_files_per_batch", &self.max_files_per_batch)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("delimiter", &(self.delimiter as char))
            .field("header_policy", &self.header_policy)
            .field("clean_cells", &self.clean_cells)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn retrieval_wait(&self) -> Duration {
        Duration::from_secs(self.retrieval_wait_secs)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs.max(1);
        self
    }

    pub fn retrieval_wait_secs(mut self, secs: u64) -> Self {
        self.config.retrieval_wait_secs = secs;
        self
    }

    pub fn max_files_per_batch(mut self, n: usize) -> Self {
        self.config.max_files_per_batch = n.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes.max(1024);
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.config.header_policy = policy;
        self
    }

    pub fn clean_cells(mut self, v: bool) -> Self {
        self.config.clean_cells = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Pdf2CsvError> {
        let c = &self.config;
        if c.storage_dir.as_os_str().is_empty() {
            return Err(Pdf2CsvError::InvalidConfig(
                "Storage directory must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Pdf2CsvError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !c.delimiter.is_ascii() || matches!(c.delimiter, b'"' | b'\r' | b'\n') {
            return Err(Pdf2CsvError::InvalidConfig(format!(
                "Delimiter must be an ASCII character other than quote, CR or LF, got {:?}",
                c.delimiter as char
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Decides whether the first row of each table is treated as a header.
///
/// The CSV always starts with the table's first row; the policy only
/// changes what the job's result descriptors report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Keep whatever the extractor reported. (default)
    #[default]
    Extractor,
    /// Every table's first row is a header.
    FirstRow,
    /// No table has a header; every row is data.
    NoHeader,
}

impl HeaderPolicy {
    /// Resolve the header flag for a table the extractor flagged `extracted`.
    pub fn resolve(self, extracted: bool) -> bool {
        match self {
            HeaderPolicy::Extractor => extracted,
            HeaderPolicy::FirstRow => true,
            HeaderPolicy::NoHeader => false,
        }
    }
}
