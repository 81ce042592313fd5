use crate::extract::{DocumentExtractor, PageTables};

use super::fallback::degrade;
use super::graph::Step;
use super::state::AnalysisState;

/// Scans the 50-page window starting at the earliest key page for tables
/// and raw text. Raw text is always captured because many reports expose no
/// machine-readable tables.
#[tracing::instrument(
    name = "pipeline_stage pdf_extractor",
    skip(documents, state),
    fields(
        pipeline.stage = "pdf_extractor",
        scan.start_page,
        scan.end_page,
        scan.pages_with_tables,
        scan.text_chars,
    )
)]
pub fn extract_financial_section(documents: &dyn DocumentExtractor, state: &mut AnalysisState) {
    if state.is_unsupported() {
        tracing::info!("unsupported file type, continuing with empty financial data");
        state.page_tables = Some(PageTables::new());
        state.extracted_text = Some(String::new());
        return;
    }

    let key_pages = state.key_pages.unwrap_or_default();
    let window = key_pages.scan_window();

    let span = tracing::Span::current();
    span.record("scan.start_page", key_pages.start_page());
    if let Some(last) = window.last() {
        span.record("scan.end_page", *last);
    }

    let tables = degrade(
        Step::ExtractFinancials,
        "tables",
        documents.extract_tables(&state.document, &window),
        PageTables::new(),
    );
    let text = degrade(
        Step::ExtractFinancials,
        "text",
        documents.extract_text(&state.document, &window),
        String::new(),
    );

    span.record("scan.pages_with_tables", tables.len());
    span.record("scan.text_chars", text.chars().count());

    state.page_tables = Some(tables);
    state.extracted_text = Some(text);
}
