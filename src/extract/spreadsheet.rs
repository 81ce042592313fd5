use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};

use super::{ExtractionError, Sheets, SpreadsheetExtractor, Table};

/// Sheet name used for the single table of a CSV file.
pub const CSV_SHEET_NAME: &str = "sheet_1";

/// Spreadsheet extractor for `.xlsx`, `.xls` and `.csv` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkbookExtractor;

impl WorkbookExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SpreadsheetExtractor for WorkbookExtractor {
    fn extract_sheets(&self, document: &[u8], filename: &str) -> Result<Sheets, ExtractionError> {
        let _span = tracing::debug_span!("extract.spreadsheet", filename = %filename).entered();

        let lower = filename.to_ascii_lowercase();
        let sheets = if lower.ends_with(".csv") {
            read_csv(document)?
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            read_workbook(document)?
        } else {
            return Err(ExtractionError::UnsupportedFormat(filename.to_string()));
        };

        tracing::debug!(sheets = sheets.len(), "spreadsheet extracted");
        Ok(sheets)
    }
}

fn read_csv(document: &[u8]) -> Result<Sheets, ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(document);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?
        .iter()
        .map(normalize_header)
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    // A header line alone carries no data.
    if rows.is_empty() {
        return Ok(Sheets::new());
    }

    Ok(Sheets::from([(
        CSV_SHEET_NAME.to_string(),
        Table::new(columns, rows),
    )]))
}

fn read_workbook(document: &[u8]) -> Result<Sheets, ExtractionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(document.to_vec()))
        .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;

    let mut sheets = Sheets::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractionError::Spreadsheet(format!("sheet {name}: {e}")))?;

        let mut rows = range.rows();
        let columns: Vec<String> = rows
            .next()
            .map(|header| header.iter().map(|c| normalize_header(&cell_text(c))).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = rows
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        sheets.push((name, Table::new(columns, rows)));
    }
    Ok(sheets)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Blank and auto-generated ("Unnamed: 3") headers carry no meaning.
fn normalize_header(header: &str) -> String {
    let header = header.trim();
    if header.to_ascii_lowercase().contains("unnamed") {
        String::new()
    } else {
        header.to_string()
    }
}
