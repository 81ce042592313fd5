use crate::extract::{DocumentExtractor, Sheets, SpreadsheetExtractor};
use crate::kpi::{KpiData, KpiFailure};

use super::fallback::degrade;
use super::graph::Step;
use super::state::{AnalysisState, Ingested};

/// Pages scanned for the table of contents.
pub const TOC_PAGES: [u32; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Spreadsheet,
    Unsupported,
}

impl DocumentKind {
    /// Classification by suffix only, ignoring case.
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            DocumentKind::Pdf
        } else if [".xlsx", ".xls", ".csv"].iter().any(|ext| lower.ends_with(ext)) {
            DocumentKind::Spreadsheet
        } else {
            DocumentKind::Unsupported
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Spreadsheet => "spreadsheet",
            DocumentKind::Unsupported => "unsupported",
        }
    }
}

#[tracing::instrument(
    name = "pipeline_stage ingestion",
    skip(documents, spreadsheets, state),
    fields(
        pipeline.stage = "ingestion",
        document.filename = %state.filename,
        document.bytes = state.document.len(),
        document.kind,
        ingest.sheets,
        ingest.toc_chars,
    )
)]
pub fn ingest(
    documents: &dyn DocumentExtractor,
    spreadsheets: &dyn SpreadsheetExtractor,
    state: &mut AnalysisState,
) {
    let span = tracing::Span::current();
    let kind = DocumentKind::from_filename(&state.filename);
    span.record("document.kind", kind.as_str());

    let ingested = match kind {
        DocumentKind::Pdf => {
            let toc = degrade(
                Step::Ingest,
                "toc_text",
                documents.extract_text(&state.document, &TOC_PAGES),
                String::new(),
            );
            span.record("ingest.toc_chars", toc.chars().count());
            Ingested::TableOfContents(toc)
        }
        DocumentKind::Spreadsheet => {
            let sheets = degrade(
                Step::Ingest,
                "sheets",
                spreadsheets.extract_sheets(&state.document, &state.filename),
                Sheets::new(),
            );
            span.record("ingest.sheets", sheets.len());
            if sheets.is_empty() {
                state.kpi_data = Some(KpiData::Unavailable(KpiFailure::NoStructuredData));
            }
            Ingested::Spreadsheet(sheets)
        }
        DocumentKind::Unsupported => {
            tracing::warn!(filename = %state.filename, "unsupported file type");
            state.kpi_data = Some(KpiData::Unavailable(KpiFailure::UnsupportedFile));
            Ingested::Unsupported
        }
    };

    state.ingested = Some(ingested);
}
