//! Pipeline stages for PDF-to-CSV extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without the others and the extractor can be swapped without
//! touching packaging.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ extract ──▶ clean ──▶ package
//! (%PDF-)      (pdfium)    (cells)   (csv / zip, atomic publish)
//! ```
//!
//! 1. [`validate`]: classify uploads by content signature; one non-PDF
//!    rejects the whole batch
//! 2. [`extract`]: turn PDF bytes into tables; blocking, so the
//!    orchestrator runs it in `spawn_blocking`
//! 3. [`clean`]: optional cell normalisation (line endings,
//!    invisible characters, trimming); never changes table shapes
//! 4. [`package`]: write one CSV per table, bundle several into a zip, and
//!    publish the job directory with a single rename

pub mod clean;
pub mod extract;
pub mod package;
pub mod validate;
