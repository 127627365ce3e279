//! Cell cleanup: deterministic normalisation of extracted cells.
//!
//! Text pulled out of a PDF carries layout debris: Windows line endings,
//! zero-width joiners from ligature handling, padding spaces. None of it
//! belongs in a CSV.
//!
//! Cleanup only rewrites cell contents. Rows, columns and tables are kept
//! exactly as the extractor reported them, so a table's dimensions and the
//! number of tables in a job never change here.
//!
//! ## Rule Order
//!
//! Line endings are normalised before trimming so a trailing `\r` is not left
//! behind.

use crate::pipeline::extract::Table;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean every cell of every table.
pub fn clean_tables(tables: Vec<Table>) -> Vec<Table> {
    tables.into_iter().map(clean_table).collect()
}

/// Apply all cleanup rules to each cell of one table.
///
/// Rules (applied in order):
/// 1. Normalise line endings inside cells (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Trim each cell
pub fn clean_table(mut table: Table) -> Table {
    for row in &mut table.rows {
        for cell in row.iter_mut() {
            let s = normalise_line_endings(cell);
            let s = remove_invisible_chars(&s);
            *cell = trim_cell(&s);
        }
    }
    table
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode ──────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

// ── Rule 3: Trim ─────────────────────────────────────────────────────────────

/// Trims the cell as a whole and each embedded line's trailing whitespace.
fn trim_cell(input: &str) -> String {
    input
        .trim()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
