//! # edgequake-pdf2csv
//!
//! Extract tables from uploaded PDF documents into CSV files.
//!
//! ## Why this crate?
//!
//! Tables locked inside PDFs are the usual last mile of a data pipeline:
//! someone has to get them into a spreadsheet. This crate accepts batches of
//! PDF uploads, extracts every table in the background, and keeps one CSV per
//! table (bundled into a zip when a document has several) under an
//! identifier the caller redeems later. Uploads are accepted immediately and
//! processed concurrently; a broken document only fails its own job.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads
//!  │
//!  ├─ 1. Validate  content sniffing (%PDF-); one non-PDF rejects the batch
//!  ├─ 2. Accept    one job per file, identifier YYYYMMDD_HHMMSSffffff
//!  ├─ 3. Extract   TableExtractor on the blocking pool (pdfium by default)
//!  ├─ 4. Clean     optional in-cell normalisation (table shapes kept)
//!  ├─ 5. Package   table_N.csv (+ tables.zip), published atomically
//!  └─ 6. Retrieve  CSV, zip, "No tables found", or processing
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2csv::{
//!     JobStore, Orchestrator, PdfiumTableExtractor, Retrieval, RetrievalService,
//!     ServiceConfig, Upload,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().storage_dir("uploads/csv").build()?;
//!     let store = Arc::new(JobStore::new());
//!     let wait = config.retrieval_wait();
//!     let orchestrator =
//!         Orchestrator::new(config, Arc::clone(&store), Arc::new(PdfiumTableExtractor::new()))?;
//!     let retrieval = RetrievalService::new(store, orchestrator.packager().clone(), wait);
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let handles = orchestrator.submit(vec![Upload::new("report.pdf", bytes)]).await?;
//!     let uid = handles[0].id().to_string();
//!
//!     match retrieval.retrieve(&uid).await? {
//!         Retrieval::File(file) => std::fs::write(&file.filename, &file.bytes)?,
//!         Retrieval::NoTables { message } => eprintln!("{message}"),
//!         Retrieval::Processing { .. } => eprintln!("still running"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `server` | via `cli` | HTTP adapter ([`server::router`]) on axum |
//! | `cli`    | on        | Enables the `pdf2csv` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable default features when embedding only the library:
//! ```toml
//! edgequake-pdf2csv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod retrieve;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{HeaderPolicy, ServiceConfig, ServiceConfigBuilder};
pub use error::{ExtractionFailure, JobError, Pdf2CsvError};
pub use job::{secure_filename, Artifacts, Job, JobId, JobStatus, ResultFile, Submission, Upload};
pub use orchestrator::{JobHandle, Orchestrator};
pub use pipeline::extract::{detect_tables, PdfiumTableExtractor, Table, TableExtractor};
pub use pipeline::package::ResultPackager;
pub use pipeline::validate::{validate, PdfCheck};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use retrieve::{ResultDownload, Retrieval, RetrievalService, NO_TABLES_MESSAGE};
pub use store::JobStore;
