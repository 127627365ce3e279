//! Job records: identifiers, lifecycle status, and result descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Opaque identifier of one processed upload.
///
/// Rendered as `YYYYMMDD_HHMMSSffffff` (UTC, microsecond resolution), so
/// identifiers sort chronologically and are safe to use as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a freshly generated identifier. Only the store mints these.
    pub(crate) fn new_unchecked(id: String) -> Self {
        Self(id)
    }

    /// Parse a caller-supplied identifier.
    ///
    /// Returns `None` for anything the generator could never have produced,
    /// which keeps arbitrary strings (`..`, `/`) away from the storage root.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = !s.is_empty()
            && s.len() <= 64
            && s.bytes().all(|b| b.is_ascii_digit() || b == b'_');
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Accepted ──▶ Extracting ──┬──▶ CompletedWithTables
///                           ├──▶ CompletedNoTables
///                           └──▶ Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Accepted,
    Extracting,
    CompletedWithTables,
    CompletedNoTables,
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::CompletedWithTables | JobStatus::CompletedNoTables | JobStatus::Failed { .. }
        )
    }

    /// Short label used in logs and CLI summaries.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Extracting => "extracting",
            JobStatus::CompletedWithTables => "completed",
            JobStatus::CompletedNoTables => "no tables",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Descriptor of one published result file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    /// File name inside the job directory, e.g. `table_1.csv`.
    pub name: String,
    pub size_bytes: u64,
    /// Absolute or storage-relative path of the published file.
    pub path: PathBuf,
    /// Number of CSV records written (header included).
    pub rows: usize,
    /// Widest row of the table.
    pub columns: usize,
    /// 1-based page the table was found on, when the extractor knows it.
    pub page: Option<usize>,
    pub has_header: bool,
}

/// Everything the packager published for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    /// One CSV per table, in extraction order.
    pub files: Vec<ResultFile>,
    /// Bundle of all CSVs; present only when there is more than one table.
    pub archive: Option<ResultFile>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One tracked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Sanitised name of the uploaded file.
    pub filename: String,
    pub status: JobStatus,
    pub results: Vec<ResultFile>,
    pub archive: Option<ResultFile>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn accepted(id: JobId, filename: String) -> Self {
        Self {
            id,
            filename,
            status: JobStatus::Accepted,
            results: Vec::new(),
            archive: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Raw upload: bytes plus the filename the client declared.
#[derive(Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Per-file answer to a submission: the identifier to retrieve results with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub uid: JobId,
    pub file_name: String,
}

/// Reduce a client-supplied filename to a safe, flat name.
///
/// Directory components are dropped and letters are folded to ASCII (NFKD,
/// so `café` becomes `cafe`). Runs of whitespace become a single `_`,
/// anything other than ASCII letters, digits, `.`, `-` and `_` is removed,
/// and dots and underscores are stripped from both ends. An empty result
/// becomes `upload.pdf`.
pub fn secure_filename(name: &str) -> String {
    let normalised = name.replace('\\', "/");
    let base = Path::new(&normalised)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .next_back()
        .unwrap_or("");

    let ascii: String = base.nfkd().filter(char::is_ascii).collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let cleaned = cleaned.trim_matches(['.', '_']);
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}
