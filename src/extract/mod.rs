pub mod pdf;
pub mod spreadsheet;

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

pub use pdf::PdfExtractor;
pub use spreadsheet::WorkbookExtractor;

/// Tables found in a document, keyed by 1-indexed page number.
pub type PageTables = BTreeMap<u32, Vec<Table>>;

/// Sheets of a workbook as `(name, table)` pairs, in workbook order.
pub type Sheets = Vec<(String, Table)>;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF parsing failed: {0}")]
    Pdf(String),

    #[error("Spreadsheet parsing failed: {0}")]
    Spreadsheet(String),

    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),
}

/// A named 2-D table of string cells. Header cells may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.columns.len()))
            .max()
            .unwrap_or(0);
        if width == 0 {
            return String::new();
        }

        let render = |cells: &[String]| {
            let mut line = String::from("|");
            for i in 0..width {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                line.push(' ');
                line.push_str(&cell.replace('|', "\\|"));
                line.push_str(" |");
            }
            line
        };

        let mut out = render(&self.columns);
        out.push('\n');
        out.push('|');
        out.push_str(&" --- |".repeat(width));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&render(row));
        }
        out
    }
}

/// Text and table extraction from paginated documents.
pub trait DocumentExtractor: Send + Sync {
    /// Concatenated text of the requested 1-indexed pages. Pages outside the
    /// document are skipped.
    fn extract_text(&self, document: &[u8], pages: &[u32]) -> Result<String, ExtractionError>;

    fn extract_tables(&self, document: &[u8], pages: &[u32])
    -> Result<PageTables, ExtractionError>;
}

/// Tabular extraction from spreadsheet files.
pub trait SpreadsheetExtractor: Send + Sync {
    fn extract_sheets(&self, document: &[u8], filename: &str) -> Result<Sheets, ExtractionError>;
}
