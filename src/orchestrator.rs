//! Extraction orchestrator: drives each accepted upload to a terminal state.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ──▶ validate batch ──▶ create job (Accepted) ──▶ Extracting
//!                                                            │
//!            wait for worker permit ◀────────────────────────┘
//!                     │
//!            spawn_blocking(extract) ── timeout / cancel ──▶ Failed
//!                     │
//!            clean ──▶ header policy ──▶ package ──▶ Completed{WithTables,NoTables}
//! ```
//!
//! ## Why one task per file?
//!
//! Every file of a batch is an independent job: a corrupt PDF fails its own
//! job and leaves its siblings running. Each job gets its own Tokio task and
//! owns its upload bytes; the only shared state is the [`JobStore`].
//!
//! A supervising task wraps each job task. If the job task panics, the
//! supervisor still records `Failed`, so no job stays `Extracting` forever.
//!
//! ## Worker permits
//!
//! A `Semaphore` sized by [`ServiceConfig::concurrency`] bounds concurrent
//! extractions. The permit is moved into the blocking closure and released
//! only when the extractor returns, even if the job already timed out.

use crate::config::{HeaderPolicy, ServiceConfig};
use crate::error::{JobError, Pdf2CsvError};
use crate::job::{secure_filename, Artifacts, JobId, JobStatus, Submission, Upload};
use crate::pipeline::clean::clean_tables;
use crate::pipeline::extract::{Table, TableExtractor};
use crate::pipeline::package::ResultPackager;
use crate::pipeline::validate::validate_batch;
use crate::progress::ProgressCallback;
use crate::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Accepts batches of uploads and runs one extraction job per file.
pub struct Orchestrator {
    config: ServiceConfig,
    store: Arc<JobStore>,
    extractor: Arc<dyn TableExtractor>,
    packager: ResultPackager,
    permits: Arc<Semaphore>,
}

impl Orchestrator {
    /// Create an orchestrator writing artifacts under `config.storage_dir`.
    ///
    /// # Errors
    /// [`Pdf2CsvError::StorageUnavailable`] if the storage root cannot be
    /// created.
    pub fn new(
        config: ServiceConfig,
        store: Arc<JobStore>,
        extractor: Arc<dyn TableExtractor>,
    ) -> Result<Self, Pdf2CsvError> {
        let packager = ResultPackager::new(&config.storage_dir, config.delimiter)?;
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Ok(Self {
            config,
            store,
            extractor,
            packager,
            permits,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn packager(&self) -> &ResultPackager {
        &self.packager
    }

    /// Validate a batch and start one job per file.
    ///
    /// Returns as soon as every job is `Extracting`; the handles resolve when
    /// the jobs finish. Identifiers are retrievable immediately.
    ///
    /// # Errors
    /// Batch-level rejections ([`Pdf2CsvError::NotAPdf`],
    /// [`Pdf2CsvError::EmptyBatch`], [`Pdf2CsvError::BatchTooLarge`]) create
    /// no jobs at all.
    pub async fn submit(&self, uploads: Vec<Upload>) -> Result<Vec<JobHandle>, Pdf2CsvError> {
        validate_batch(&uploads, self.config.max_files_per_batch)?;

        let mut handles = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let filename = secure_filename(&upload.filename);
            let id = self.store.create(&filename);
            self.store
                .update(&id, JobStatus::Extracting, Artifacts::default())?;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_job_accepted(id.as_str(), &filename);
            }
            debug!(
                "Job {} accepted for '{}' ({} bytes)",
                id,
                filename,
                upload.bytes.len()
            );

            let cancel = CancellationToken::new();
            let ctx = JobContext {
                id: id.clone(),
                store: Arc::clone(&self.store),
                extractor: Arc::clone(&self.extractor),
                packager: self.packager.clone(),
                permits: Arc::clone(&self.permits),
                timeout: self.config.extraction_timeout(),
                header_policy: self.config.header_policy,
                clean_cells: self.config.clean_cells,
                callback: self.config.progress_callback.clone(),
                cancel: cancel.clone(),
            };
            let task = tokio::spawn(supervise(ctx, upload.bytes));

            handles.push(JobHandle {
                id,
                filename,
                cancel,
                task,
                store: Arc::clone(&self.store),
            });
        }

        info!("Accepted batch of {} file(s)", handles.len());
        Ok(handles)
    }
}

/// Promise-like handle to one running job.
///
/// Dropping the handle detaches the job; it still runs to completion and its
/// outcome is recorded in the store.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    filename: String,
    cancel: CancellationToken,
    task: JoinHandle<JobStatus>,
    store: Arc<JobStore>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Sanitised filename the job was recorded under.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The `{uid, file_name}` pair reported to the submitter.
    pub fn submission(&self) -> Submission {
        Submission {
            uid: self.id.clone(),
            file_name: self.filename.clone(),
        }
    }

    /// Request cancellation.
    ///
    /// Honoured while the job waits for a worker permit or while extraction
    /// is in flight; the job then fails with a cancellation reason. Has no
    /// effect once the job reached a terminal state.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> JobStatus {
        match self.task.await {
            Ok(status) => status,
            Err(e) => {
                // The supervisor itself was aborted (runtime shutdown).
                let status = JobStatus::Failed {
                    reason: JobError::TaskPanicked {
                        detail: e.to_string(),
                    }
                    .to_string(),
                };
                match self.store.update(&self.id, status.clone(), Artifacts::default()) {
                    Ok(job) => job.status,
                    Err(_) => self.store.get(&self.id).map(|j| j.status).unwrap_or(status),
                }
            }
        }
    }
}

// ── Per-job execution ────────────────────────────────────────────────────────

#[derive(Clone)]
struct JobContext {
    id: JobId,
    store: Arc<JobStore>,
    extractor: Arc<dyn TableExtractor>,
    packager: ResultPackager,
    permits: Arc<Semaphore>,
    timeout: Duration,
    header_policy: HeaderPolicy,
    clean_cells: bool,
    callback: Option<ProgressCallback>,
    cancel: CancellationToken,
}

/// Run the job in its own task and record whatever comes out of it.
async fn supervise(ctx: JobContext, bytes: Vec<u8>) -> JobStatus {
    let inner = tokio::spawn(run(ctx.clone(), bytes));
    let outcome = match inner.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Job {} task aborted: {}", ctx.id, e);
            Err(JobError::TaskPanicked {
                detail: e.to_string(),
            })
        }
    };
    finish(&ctx, outcome)
}

async fn run(ctx: JobContext, bytes: Vec<u8>) -> Result<Artifacts, JobError> {
    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(JobError::Cancelled),
        permit = Arc::clone(&ctx.permits).acquire_owned() => {
            permit.map_err(|e| JobError::TaskPanicked { detail: e.to_string() })?
        }
    };

    if let Some(ref cb) = ctx.callback {
        cb.on_extraction_start(ctx.id.as_str());
    }
    debug!("Job {} extracting", ctx.id);

    let extractor = Arc::clone(&ctx.extractor);
    let extraction = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        extractor.extract(&bytes)
    });

    let tables = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(JobError::Cancelled),
        res = tokio::time::timeout(ctx.timeout, extraction) => match res {
            Err(_) => {
                warn!("Job {} timed out after {:?}", ctx.id, ctx.timeout);
                return Err(JobError::Timeout { secs: ctx.timeout.as_secs() });
            }
            Ok(Err(join)) => return Err(JobError::TaskPanicked { detail: join.to_string() }),
            Ok(Ok(result)) => result?,
        },
    };

    let tables = prepare_tables(tables, ctx.clean_cells, ctx.header_policy);
    debug!("Job {} yielded {} table(s)", ctx.id, tables.len());

    let packager = ctx.packager.clone();
    let id = ctx.id.clone();
    tokio::task::spawn_blocking(move || packager.package(&id, &tables))
        .await
        .map_err(|e| JobError::TaskPanicked {
            detail: e.to_string(),
        })?
}

/// Cleanup and header policy. Every extracted table reaches the packager.
fn prepare_tables(tables: Vec<Table>, clean: bool, policy: HeaderPolicy) -> Vec<Table> {
    let mut tables = if clean { clean_tables(tables) } else { tables };
    for table in &mut tables {
        table.has_header = policy.resolve(table.has_header);
    }
    tables
}

fn finish(ctx: &JobContext, outcome: Result<Artifacts, JobError>) -> JobStatus {
    let (status, artifacts) = match outcome {
        Ok(artifacts) if artifacts.is_empty() => (JobStatus::CompletedNoTables, artifacts),
        Ok(artifacts) => (JobStatus::CompletedWithTables, artifacts),
        Err(e) => (
            JobStatus::Failed {
                reason: e.to_string(),
            },
            Artifacts::default(),
        ),
    };
    let table_count = artifacts.files.len();

    match &status {
        JobStatus::Failed { reason } => {
            warn!("Job {} failed: {}", ctx.id, reason);
            if let Some(ref cb) = ctx.callback {
                cb.on_job_failed(ctx.id.as_str(), reason);
            }
        }
        _ => {
            info!("Job {} finished: {} table(s)", ctx.id, table_count);
            if let Some(ref cb) = ctx.callback {
                cb.on_job_complete(ctx.id.as_str(), table_count);
            }
        }
    }

    match ctx.store.update(&ctx.id, status.clone(), artifacts) {
        Ok(job) => job.status,
        Err(e) => {
            warn!("Could not record outcome of job {}: {}", ctx.id, e);
            ctx.store.get(&ctx.id).map(|j| j.status).unwrap_or(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionFailure;
    use tempfile::TempDir;

    const PDF: &[u8] = b"%PDF-1.7\n%%EOF\n";

    fn orchestrator(dir: &TempDir, extractor: Arc<dyn TableExtractor>) -> Orchestrator {
        orchestrator_with(dir, extractor, |b| b)
    }

    fn orchestrator_with(
        dir: &TempDir,
        extractor: Arc<dyn TableExtractor>,
        tweak: impl FnOnce(crate::config::ServiceConfigBuilder) -> crate::config::ServiceConfigBuilder,
    ) -> Orchestrator {
        let config = tweak(ServiceConfig::builder().storage_dir(dir.path().join("csv")))
            .build()
            .unwrap();
        Orchestrator::new(config, Arc::new(JobStore::new()), extractor).unwrap()
    }

    fn one_table() -> Arc<dyn TableExtractor> {
        Arc::new(|_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
            Ok(vec![Table::from_rows([["a", "b"], ["1", "2"]])])
        })
    }

    #[tokio::test]
    async fn submit_reports_extracting_immediately() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, one_table());
        let handles = orch
            .submit(vec![Upload::new("../report.pdf", PDF)])
            .await
            .unwrap();

        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].filename(), "report.pdf");
        let sub = handles[0].submission();
        assert_eq!(sub.file_name, "report.pdf");
        assert!(orch.store().get(&sub.uid).is_some());
    }

    #[tokio::test]
    async fn rejected_batch_creates_no_jobs() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, one_table());
        let err = orch
            .submit(vec![
                Upload::new("a.pdf", PDF),
                Upload::new("b.pdf", b"not a pdf".to_vec()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2CsvError::NotAPdf { .. }));
        assert!(orch.store().is_empty());
    }

    #[tokio::test]
    async fn one_table_completes_with_tables() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, one_table());
        let handle = orch
            .submit(vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap()
            .remove(0);
        let id = handle.id().clone();

        assert_eq!(handle.wait().await, JobStatus::CompletedWithTables);
        let job = orch.store().get(&id).unwrap();
        assert_eq!(job.results.len(), 1);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn empty_result_completes_without_tables() {
        let dir = TempDir::new().unwrap();
        let extractor: Arc<dyn TableExtractor> =
            Arc::new(|_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> { Ok(vec![]) });
        let orch = orchestrator(&dir, extractor);
        let handle = orch
            .submit(vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap()
            .remove(0);
        let id = handle.id().clone();

        assert_eq!(handle.wait().await, JobStatus::CompletedNoTables);
        assert!(!orch.packager().job_dir(&id).exists());
    }

    #[tokio::test]
    async fn extraction_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let extractor: Arc<dyn TableExtractor> =
            Arc::new(|_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
                Err(ExtractionFailure::new("xref table is corrupt"))
            });
        let orch = orchestrator(&dir, extractor);
        let handle = orch
            .submit(vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap()
            .remove(0);

        match handle.wait().await {
            JobStatus::Failed { reason } => assert!(reason.contains("xref table is corrupt")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_extractor_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let extractor: Arc<dyn TableExtractor> =
            Arc::new(|_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
                panic!("extractor bug")
            });
        let orch = orchestrator(&dir, extractor);
        let handle = orch
            .submit(vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap()
            .remove(0);
        let id = handle.id().clone();

        assert!(matches!(handle.wait().await, JobStatus::Failed { .. }));
        assert!(orch.store().get(&id).unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn slow_extraction_times_out() {
        let dir = TempDir::new().unwrap();
        let extractor: Arc<dyn TableExtractor> =
            Arc::new(|_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
                std::thread::sleep(Duration::from_millis(2500));
                Ok(vec![])
            });
        let orch = orchestrator_with(&dir, extractor, |b| b.extraction_timeout_secs(1));
        let handle = orch
            .submit(vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap()
            .remove(0);

        match handle.wait().await {
            JobStatus::Failed { reason } => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_job_fails() {
        let dir = TempDir::new().unwrap();
        let extractor: Arc<dyn TableExtractor> =
            Arc::new(|_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(vec![])
            });
        let orch = orchestrator(&dir, extractor);
        let handle = orch
            .submit(vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap()
            .remove(0);
        handle.cancel();

        match handle.wait().await {
            JobStatus::Failed { reason } => assert!(reason.contains("cancelled"), "{reason}"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn header_policy_applies_after_cleanup() {
        let tables = vec![
            Table::from_rows([["h"], ["1"]]).with_header(true),
            Table::from_rows([[" ", ""]]),
        ];
        let prepared = prepare_tables(tables.clone(), true, HeaderPolicy::NoHeader);
        assert_eq!(prepared.len(), 2);
        assert!(prepared.iter().all(|t| !t.has_header));
        assert_eq!(prepared[1].rows, vec![vec!["", ""]]);

        let prepared = prepare_tables(tables, false, HeaderPolicy::FirstRow);
        assert_eq!(prepared.len(), 2);
        assert!(prepared.iter().all(|t| t.has_header));
    }
}
