//! Retrieval: identifier → artifact, "no tables" notice, or error.
//!
//! | Job status | Outcome |
//! |---|---|
//! | unknown / malformed identifier | `Err(JobNotFound)` |
//! | completed, no tables | [`Retrieval::NoTables`] |
//! | completed, one table | [`Retrieval::File`] with the CSV |
//! | completed, several tables | [`Retrieval::File`] with `tables.zip` |
//! | failed | `Err(JobFailed)` |
//! | still running | waits up to `retrieval_wait`, then [`Retrieval::Processing`] |
//!
//! Artifacts are read from disk on every call. They are written once and
//! never modified, so repeated retrievals return identical bytes.

use crate::error::Pdf2CsvError;
use crate::job::{Job, JobId, JobStatus, ResultFile};
use crate::pipeline::package::ResultPackager;
use crate::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Message returned for a job that completed without finding any table.
pub const NO_TABLES_MESSAGE: &str = "No tables found";

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Outcome of a successful retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// The job's artifact: a single CSV or the archive of all CSVs.
    File(ResultDownload),
    /// The job completed and found nothing. Not an error.
    NoTables { message: String },
    /// The job did not finish within the retrieval wait.
    Processing { job: Job },
}

/// An artifact read back from storage.
#[derive(Clone, PartialEq, Eq)]
pub struct ResultDownload {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ResultDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultDownload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Answers retrieval, status and delete requests.
#[derive(Debug, Clone)]
pub struct RetrievalService {
    store: Arc<JobStore>,
    packager: ResultPackager,
    wait: Duration,
}

impl RetrievalService {
    pub fn new(store: Arc<JobStore>, packager: ResultPackager, wait: Duration) -> Self {
        Self {
            store,
            packager,
            wait,
        }
    }

    /// Fetch the outcome of job `uid`, waiting for it if it is still running.
    pub async fn retrieve(&self, uid: &str) -> Result<Retrieval, Pdf2CsvError> {
        let id = parse_id(uid)?;
        let job = self.await_terminal(&id).await?;

        match &job.status {
            JobStatus::CompletedNoTables => Ok(Retrieval::NoTables {
                message: NO_TABLES_MESSAGE.to_string(),
            }),
            JobStatus::CompletedWithTables => {
                let (artifact, content_type) = match (&job.archive, job.results.as_slice()) {
                    (Some(archive), _) => (archive, ZIP_CONTENT_TYPE),
                    (None, [single]) => (single, CSV_CONTENT_TYPE),
                    (None, files) => {
                        return Err(Pdf2CsvError::Internal(format!(
                            "job {} completed with {} result files and no archive",
                            id,
                            files.len()
                        )))
                    }
                };
                let download = read_artifact(artifact, content_type).await?;
                debug!(
                    "Serving {} ({} bytes) for job {}",
                    download.filename,
                    download.bytes.len(),
                    id
                );
                Ok(Retrieval::File(download))
            }
            JobStatus::Failed { reason } => Err(Pdf2CsvError::JobFailed {
                id: id.to_string(),
                reason: reason.clone(),
            }),
            JobStatus::Accepted | JobStatus::Extracting => {
                Ok(Retrieval::Processing { job: job.clone() })
            }
        }
    }

    /// Current job record, without waiting.
    pub fn status(&self, uid: &str) -> Result<Job, Pdf2CsvError> {
        let id = parse_id(uid)?;
        self.store
            .get(&id)
            .ok_or_else(|| Pdf2CsvError::JobNotFound { id: id.to_string() })
    }

    /// Forget a finished job and remove its artifacts.
    ///
    /// # Errors
    /// [`Pdf2CsvError::JobInFlight`] while the job is still running.
    pub fn delete(&self, uid: &str) -> Result<(), Pdf2CsvError> {
        let job = self.status(uid)?;
        if !job.status.is_terminal() {
            return Err(Pdf2CsvError::JobInFlight {
                id: job.id.to_string(),
            });
        }
        self.packager.discard(&job.id)?;
        self.store.remove(&job.id);
        info!("Deleted job {}", job.id);
        Ok(())
    }

    async fn await_terminal(&self, id: &JobId) -> Result<Job, Pdf2CsvError> {
        let mut rx = self
            .store
            .subscribe(id)
            .ok_or_else(|| Pdf2CsvError::JobNotFound { id: id.to_string() })?;

        let current = rx.borrow_and_update().clone();
        if current.status.is_terminal() || self.wait.is_zero() {
            return Ok(current);
        }

        debug!(
            "Job {} still {}; waiting up to {:?}",
            id,
            current.status.label(),
            self.wait
        );
        let waited = tokio::time::timeout(self.wait, rx.wait_for(|job| job.status.is_terminal()))
            .await
            .map(|res| res.map(|job| job.clone()));
        match waited {
            Ok(Ok(job)) => Ok(job),
            // Feed closed: the job was removed while we waited.
            Ok(Err(_)) => Err(Pdf2CsvError::JobNotFound { id: id.to_string() }),
            Err(_) => Ok(rx.borrow().clone()),
        }
    }
}

fn parse_id(uid: &str) -> Result<JobId, Pdf2CsvError> {
    JobId::parse(uid).ok_or_else(|| Pdf2CsvError::JobNotFound {
        id: uid.to_string(),
    })
}

async fn read_artifact(
    file: &ResultFile,
    content_type: &'static str,
) -> Result<ResultDownload, Pdf2CsvError> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .map_err(|source| Pdf2CsvError::ResultReadFailed {
            path: file.path.clone(),
            source,
        })?;
    Ok(ResultDownload {
        filename: file.name.clone(),
        content_type,
        bytes,
    })
}
