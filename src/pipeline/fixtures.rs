//! In-memory extractors for pipeline tests.

use std::sync::Mutex;

use crate::extract::pdf::PAGE_SEPARATOR;
use crate::extract::{
    DocumentExtractor, ExtractionError, PageTables, Sheets, SpreadsheetExtractor, Table,
};

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// A paginated document with fixed page text and optional tables.
pub struct StaticDocument {
    pages: Vec<String>,
    tables: PageTables,
    requests: Mutex<Vec<Vec<u32>>>,
}

impl StaticDocument {
    pub fn pages(pages: &[&str]) -> Self {
        Self {
            pages: strings(pages),
            tables: PageTables::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, page: u32, table: Table) -> Self {
        self.tables.entry(page).or_default().push(table);
        self
    }

    /// Page lists passed to `extract_text`, in call order.
    pub fn requested(&self) -> Vec<Vec<u32>> {
        self.requests.lock().unwrap().clone()
    }
}

impl DocumentExtractor for StaticDocument {
    fn extract_text(&self, _document: &[u8], pages: &[u32]) -> Result<String, ExtractionError> {
        self.requests.lock().unwrap().push(pages.to_vec());
        let mut text = String::new();
        for page in pages {
            if let Some(content) = (*page as usize)
                .checked_sub(1)
                .and_then(|i| self.pages.get(i))
            {
                text.push_str(content);
                text.push_str(PAGE_SEPARATOR);
            }
        }
        Ok(text)
    }

    fn extract_tables(
        &self,
        _document: &[u8],
        pages: &[u32],
    ) -> Result<PageTables, ExtractionError> {
        Ok(self
            .tables
            .iter()
            .filter(|(page, _)| pages.contains(page))
            .map(|(page, tables)| (*page, tables.clone()))
            .collect())
    }
}

/// Fails every call the way an unreadable PDF does.
pub struct FailingDocument;

impl DocumentExtractor for FailingDocument {
    fn extract_text(&self, _document: &[u8], _pages: &[u32]) -> Result<String, ExtractionError> {
        Err(ExtractionError::Pdf("invalid file header".to_string()))
    }

    fn extract_tables(
        &self,
        _document: &[u8],
        _pages: &[u32],
    ) -> Result<PageTables, ExtractionError> {
        Err(ExtractionError::Pdf("invalid file header".to_string()))
    }
}

pub struct StaticWorkbook {
    sheets: Option<Sheets>,
}

impl StaticWorkbook {
    pub fn empty() -> Self {
        Self {
            sheets: Some(Sheets::new()),
        }
    }

    pub fn failing() -> Self {
        Self { sheets: None }
    }

    pub fn with_rows(sheet: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        let table = Table::new(strings(columns), rows.iter().map(|r| strings(r)).collect());
        Self {
            sheets: Some(Sheets::from([(sheet.to_string(), table)])),
        }
    }
}

impl SpreadsheetExtractor for StaticWorkbook {
    fn extract_sheets(&self, _document: &[u8], filename: &str) -> Result<Sheets, ExtractionError> {
        self.sheets
            .clone()
            .ok_or_else(|| ExtractionError::Spreadsheet(format!("cannot open {filename}")))
    }
}
