//! In-process job store.
//!
//! Each job lives in its own `tokio::sync::watch` cell inside a `DashMap`
//! keyed by [`JobId`]. A cell always holds a complete [`Job`] value: updates
//! replace it under the cell's lock, so a reader sees either the old record
//! or the new one, never a mix. The same cell doubles as a change feed that
//! retrieval uses to wait for an in-flight job to finish.

use crate::error::Pdf2CsvError;
use crate::job::{Artifacts, Job, JobId, JobStatus};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Maps identifiers to job records for the lifetime of the process.
#[derive(Debug)]
pub struct JobStore {
    jobs: DashMap<JobId, watch::Sender<Job>>,
    ids: IdGenerator,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            ids: IdGenerator::default(),
        }
    }

    /// Issue a new identifier and record an `Accepted` job for `filename`.
    pub fn create(&self, filename: &str) -> JobId {
        loop {
            let id = self.ids.next_id();
            match self.jobs.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    let (tx, _rx) = watch::channel(Job::accepted(id.clone(), filename.to_string()));
                    slot.insert(tx);
                    debug!("Created job {} for '{}'", id, filename);
                    return id;
                }
                Entry::Occupied(_) => {
                    warn!("Job identifier {} already issued; generating another", id);
                }
            }
        }
    }

    /// Move a job to `status`, replacing its result descriptors.
    ///
    /// Terminal jobs are immutable: updating one fails with
    /// [`Pdf2CsvError::JobAlreadyTerminal`].
    pub fn update(
        &self,
        id: &JobId,
        status: JobStatus,
        artifacts: Artifacts,
    ) -> Result<Job, Pdf2CsvError> {
        let cell = self.jobs.get(id).ok_or_else(|| Pdf2CsvError::JobNotFound {
            id: id.to_string(),
        })?;

        let mut rejected = false;
        cell.send_if_modified(|job| {
            if job.status.is_terminal() {
                rejected = true;
                return false;
            }
            if status.is_terminal() {
                job.finished_at = Some(Utc::now());
            }
            job.status = status;
            job.results = artifacts.files;
            job.archive = artifacts.archive;
            true
        });

        if rejected {
            return Err(Pdf2CsvError::JobAlreadyTerminal { id: id.to_string() });
        }
        let job = cell.borrow().clone();
        Ok(job)
    }

    /// Snapshot of the job, or `None` if the identifier is unknown.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|cell| cell.borrow().clone())
    }

    /// Change feed for one job; yields the complete record after every update.
    pub fn subscribe(&self, id: &JobId) -> Option<watch::Receiver<Job>> {
        self.jobs.get(id).map(|cell| cell.subscribe())
    }

    /// Forget a job. Subscribers observe the feed closing.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs
            .remove(id)
            .map(|(_, cell)| cell.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Monotonic timestamp identifiers.
///
/// Identifiers are the wall clock in microseconds, rendered as
/// `YYYYMMDD_HHMMSSffffff`. Two requests landing on the same microsecond (or
/// a clock that steps backwards) get the previous value plus one, so the
/// generator never repeats itself within a process.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
    last_micros: AtomicI64,
}

impl IdGenerator {
    pub(crate) fn next_id(&self) -> JobId {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format_id(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

fn format_id(micros: i64) -> JobId {
    let ts = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(Utc::now);
    JobId::new_unchecked(ts.format("%Y%m%d_%H%M%S%6f").to_string())
}
