//! Table extraction: PDF bytes → ordered list of tables.
//!
//! The orchestrator only depends on the [`TableExtractor`] trait; how tables
//! are found inside a page is the extractor's business. Any closure
//! `Fn(&[u8]) -> Result<Vec<Table>, ExtractionFailure>` is an extractor,
//! which is how tests and embedders plug in their own.
//!
//! ## Why a blocking trait?
//!
//! PDF engines (pdfium included) are synchronous C libraries. The trait is
//! plain `fn` and the orchestrator moves each call onto the blocking thread
//! pool with `tokio::task::spawn_blocking`, keeping Tokio workers free.
//!
//! ## Default extractor
//!
//! [`PdfiumTableExtractor`] reads each page's text layer through pdfium and
//! treats runs of aligned, multi-column lines as a table. It is a layout
//! heuristic for text-based PDFs, not a ruling-line detector.

use crate::error::ExtractionFailure;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// One extracted table: ordered rows of string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// 1-based page the table was found on, if known.
    pub page: Option<usize>,
    pub rows: Vec<Vec<String>>,
    /// The first row holds column names rather than data.
    pub has_header: bool,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            page: None,
            rows,
            has_header: false,
        }
    }

    /// Build a table from string slices; convenient in tests and examples.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Turns PDF bytes into tables.
///
/// Returning `Ok(vec![])` means "no tables found", which is a normal outcome.
/// `Err` means the document could not be processed at all.
pub trait TableExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8]) -> Result<Vec<Table>, ExtractionFailure>;
}

impl<F> TableExtractor for F
where
    F: Fn(&[u8]) -> Result<Vec<Table>, ExtractionFailure> + Send + Sync,
{
    fn extract(&self, pdf: &[u8]) -> Result<Vec<Table>, ExtractionFailure> {
        self(pdf)
    }
}

/// Text-layout table extractor backed by pdfium.
///
/// Binds pdfium on every call, as the library is only safe to drive from the
/// thread that loaded the document.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTableExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumTableExtractor {
    /// Use the pdfium library resolved by `pdfium-auto` (cached download or
    /// `PDFIUM_LIB_PATH`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the pdfium library at `path`.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, ExtractionFailure> {
        let bound = match &self.library_path {
            Some(path) => pdfium_auto::bind_pdfium_from_path(path),
            None => pdfium_auto::bind_pdfium_silent(),
        };
        bound.map_err(|e| ExtractionFailure::new(format!("PDF engine unavailable: {e}")))
    }
}

impl TableExtractor for PdfiumTableExtractor {
    fn extract(&self, pdf: &[u8]) -> Result<Vec<Table>, ExtractionFailure> {
        let pdfium = self.bind()?;
        let document = pdfium.load_pdf_from_byte_slice(pdf, None).map_err(|e| {
            let detail = format!("{:?}", e);
            if detail.contains("Password") || detail.contains("password") {
                ExtractionFailure::new("PDF is encrypted and requires a password")
            } else {
                ExtractionFailure::new(format!("PDF is corrupt or unsupported: {detail}"))
            }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut tables = Vec::new();
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| {
                ExtractionFailure::new(format!("Text layer unreadable on page {}: {:?}", idx + 1, e))
            })?;
            let found = detect_tables(&text.all());
            debug!("Page {}: {} table(s)", idx + 1, found.len());
            tables.extend(found.into_iter().map(|t| t.on_page(idx + 1)));
        }

        Ok(tables)
    }
}

/// Column gaps: a tab, or two or more spaces.
static CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {2,}").unwrap());

/// Find tables in one page of extracted text.
///
/// A line that splits into two or more cells on column gaps is a row
/// candidate. Two or more consecutive candidates with the same cell count
/// form a table; anything else ends the current run.
pub fn detect_tables(page_text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    let mut flush = |run: &mut Vec<Vec<String>>| {
        if run.len() >= 2 {
            tables.push(Table::new(std::mem::take(run)));
        } else {
            run.clear();
        }
    };

    for line in page_text.lines() {
        let cells = split_cells(line);
        if cells.len() < 2 {
            flush(&mut run);
            continue;
        }
        if run.first().is_some_and(|first| first.len() != cells.len()) {
            flush(&mut run);
        }
        run.push(cells);
    }
    flush(&mut run);

    tables
}

fn split_cells(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    CELL_GAP
        .split(line)
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_dimensions() {
        let t = Table::from_rows([vec!["a", "b"], vec!["c", "d", "e"], vec![]]);
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.column_count(), 3);
        assert!(!t.is_empty());
        assert_eq!(Table::default().column_count(), 0);
    }

    #[test]
    fn closures_are_extractors() {
        let extractor = |_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
            Ok(vec![Table::from_rows([["x", "y"]])])
        };
        let tables = extractor.extract(b"%PDF-1.7").unwrap();
        assert_eq!(tables.len(), 1);

        let failing = |_: &[u8]| -> Result<Vec<Table>, ExtractionFailure> {
            Err(ExtractionFailure::new("broken xref"))
        };
        assert_eq!(failing.extract(b"").unwrap_err().detail, "broken xref");
    }

    #[test]
    fn detects_single_aligned_table() {
        let text = "Quarterly results\n\
                    Region    Revenue    Cost\n\
                    North     1200       800\n\
                    South     900        650\n\
                    \n\
                    Figures are unaudited.";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[0], vec!["Region", "Revenue", "Cost"]);
        assert_eq!(tables[0].row_count(), 3);
        assert_eq!(tables[0].column_count(), 3);
    }

    #[test]
    fn tabs_separate_cells() {
        let tables = detect_tables("id\tname\n1\tAda\n2\tGrace\n");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[2], vec!["2", "Grace"]);
    }

    #[test]
    fn column_count_change_splits_tables() {
        let text = "a  b\nc  d\nx  y  z\nu  v  w\n";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].column_count(), 2);
        assert_eq!(tables[1].column_count(), 3);
    }

    #[test]
    fn prose_yields_no_tables() {
        let text = "This page has ordinary prose.\nIt wraps over lines.\nSingle spaces only.";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn lone_candidate_line_is_not_a_table() {
        assert!(detect_tables("Total    42\nthe end").is_empty());
    }

    #[test]
    fn pdfium_extractor_handles_missing_library() {
        let extractor = PdfiumTableExtractor::with_library("/nonexistent/libpdfium.so");
        let err = extractor.extract(b"%PDF-1.7").unwrap_err();
        assert!(err.detail.contains("PDF engine unavailable"), "got: {}", err.detail);
    }
}
