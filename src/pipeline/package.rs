//! Result packaging: tables → CSV files (and a zip archive) on disk.
//!
//! ## Layout
//!
//! ```text
//! <root>/<job id>/table_1.csv
//! <root>/<job id>/table_2.csv
//! <root>/<job id>/tables.zip      (only when there is more than one table)
//! ```
//!
//! Every location is derivable from the job identifier alone.
//!
//! ## Atomic publish
//!
//! Files are written into a hidden staging directory inside `root` and the
//! whole directory is renamed to `<root>/<job id>` once every file is on
//! disk. Any failure before the rename drops the staging directory, so a
//! reader never finds a half-written job directory. Staging lives under the
//! same root as the target so the rename never crosses a file system.

use crate::error::{JobError, Pdf2CsvError};
use crate::job::{Artifacts, JobId, ResultFile};
use crate::pipeline::extract::Table;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the bundle written for multi-table jobs.
pub const ARCHIVE_NAME: &str = "tables.zip";

/// Name of the CSV holding the `index`-th table (1-based).
pub fn table_file_name(index: usize) -> String {
    format!("table_{index}.csv")
}

/// Writes job artifacts under a storage root.
#[derive(Debug, Clone)]
pub struct ResultPackager {
    root: PathBuf,
    delimiter: u8,
}

impl ResultPackager {
    /// Create the packager, creating `root` if it does not exist.
    pub fn new(root: impl Into<PathBuf>, delimiter: u8) -> Result<Self, Pdf2CsvError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| Pdf2CsvError::StorageUnavailable {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, delimiter })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the published artifacts of `id`.
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Persist `tables` for job `id`.
    ///
    /// Zero tables writes nothing and returns empty [`Artifacts`].
    pub fn package(&self, id: &JobId, tables: &[Table]) -> Result<Artifacts, JobError> {
        if tables.is_empty() {
            return Ok(Artifacts::default());
        }

        let target = self.job_dir(id);
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .map_err(|e| persistence("creating staging directory", e))?;

        let mut encoded = Vec::with_capacity(tables.len());
        let mut files = Vec::with_capacity(tables.len());
        for (idx, table) in tables.iter().enumerate() {
            let name = table_file_name(idx + 1);
            let bytes = encode_csv(table, self.delimiter)?;
            std::fs::write(staging.path().join(&name), &bytes)
                .map_err(|e| persistence(&format!("writing {name}"), e))?;

            files.push(ResultFile {
                name: name.clone(),
                size_bytes: bytes.len() as u64,
                path: target.join(&name),
                rows: table.row_count(),
                columns: table.column_count(),
                page: table.page,
                has_header: table.has_header,
            });
            encoded.push((name, bytes));
        }

        let archive = if encoded.len() > 1 {
            let bytes = build_archive(&encoded)?;
            std::fs::write(staging.path().join(ARCHIVE_NAME), &bytes)
                .map_err(|e| persistence("writing archive", e))?;
            Some(ResultFile {
                name: ARCHIVE_NAME.to_string(),
                size_bytes: bytes.len() as u64,
                path: target.join(ARCHIVE_NAME),
                rows: files.iter().map(|f| f.rows).sum(),
                columns: files.iter().map(|f| f.columns).max().unwrap_or(0),
                page: None,
                has_header: false,
            })
        } else {
            None
        };

        // Publish. On failure `staging` is dropped and removed with its files.
        std::fs::rename(staging.path(), &target)
            .map_err(|e| persistence(&format!("publishing {}", target.display()), e))?;

        info!(
            "Published {} table(s) for job {}{}",
            files.len(),
            id,
            if archive.is_some() { " with archive" } else { "" }
        );
        Ok(Artifacts { files, archive })
    }

    /// Remove every artifact of `id`. A job without artifacts is not an error.
    pub fn discard(&self, id: &JobId) -> Result<(), Pdf2CsvError> {
        let dir = self.job_dir(id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Removed artifacts of job {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                warn!("Failed to remove {}: {}", dir.display(), source);
                Err(Pdf2CsvError::StorageUnavailable { path: dir, source })
            }
        }
    }
}

fn persistence(action: &str, e: impl std::fmt::Display) -> JobError {
    JobError::PersistenceFailed {
        detail: format!("{action}: {e}"),
    }
}

/// Encode one table as delimited text.
///
/// CRLF record terminator, minimal quoting, ragged rows allowed.
pub fn encode_csv(table: &Table, delimiter: u8) -> Result<Vec<u8>, JobError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::CRLF)
        .flexible(true)
        .from_writer(Vec::new());

    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| persistence("encoding CSV record", e))?;
    }

    writer
        .into_inner()
        .map_err(|e| persistence("flushing CSV", e.into_error()))
}

/// Bundle already-encoded CSVs into a deterministic zip.
///
/// Entry timestamps are fixed at 1980-01-01 and permissions at 0644, so the
/// archive bytes depend only on the entries.
fn build_archive(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, JobError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        zip.start_file(name.as_str(), entry_options())
            .map_err(|e| persistence("starting archive entry", e))?;
        zip.write_all(bytes)
            .map_err(|e| persistence("writing archive entry", e))?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| persistence("finishing archive", e))?;
    Ok(cursor.into_inner())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}
