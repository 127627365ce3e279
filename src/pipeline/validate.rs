//! Upload validation: content-based PDF detection.
//!
//! The filename an HTTP client declares is untrusted; a text file renamed to
//! `report.pdf` must be refused and a PDF saved as `scan.bin` accepted. The
//! check therefore only looks at the first bytes of the payload for the
//! `%PDF-` signature. A UTF-8 byte-order mark and leading whitespace are
//! tolerated because some generators emit them before the header.

use crate::error::Pdf2CsvError;
use crate::job::Upload;
use tracing::{debug, warn};

/// Only the head of the payload is inspected.
pub const SNIFF_LEN: usize = 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Outcome of classifying one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfCheck {
    PdfValid,
    NotPdf,
}

/// Classify `bytes` by their type signature.
pub fn validate(bytes: &[u8]) -> PdfCheck {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let head = &head[start..];

    match head.strip_prefix(b"%PDF-") {
        Some(rest) if rest.first().is_some_and(u8::is_ascii_digit) => PdfCheck::PdfValid,
        _ => PdfCheck::NotPdf,
    }
}

/// Validate a whole batch: either every upload is a PDF or none is accepted.
///
/// The error names every rejected file so the client can fix them in one go.
pub fn validate_batch(uploads: &[Upload], max_files: usize) -> Result<(), Pdf2CsvError> {
    if uploads.is_empty() {
        return Err(Pdf2CsvError::EmptyBatch);
    }
    if uploads.len() > max_files {
        return Err(Pdf2CsvError::BatchTooLarge {
            count: uploads.len(),
            max: max_files,
        });
    }

    let rejected: Vec<String> = uploads
        .iter()
        .filter(|u| validate(&u.bytes) == PdfCheck::NotPdf)
        .map(|u| u.filename.clone())
        .collect();

    if !rejected.is_empty() {
        warn!(
            "Rejecting batch of {}: {} file(s) are not PDFs",
            uploads.len(),
            rejected.len()
        );
        return Err(Pdf2CsvError::NotAPdf { rejected });
    }

    debug!("Batch of {} PDFs passed validation", uploads.len());
    Ok(())
}
