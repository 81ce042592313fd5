//! KPI extraction from PDF evidence or spreadsheet rows.
//!
//! Both variants end the same way: one fast-model call asked for the ten
//! canonical metrics as JSON. A failed call or an unparseable answer leaves
//! `KpiData::Unavailable`, never an error, because the persona steps are
//! written to work without numbers.

use std::fmt::Write as _;

use opentelemetry::KeyValue;

use crate::extract::{PageTables, Sheets, Table};
use crate::kpi::{FinancialKpis, KpiData, KpiFailure, KpiMetric};
use crate::llm::LlmClient;
use crate::telemetry::metrics::PIPELINE_KPIS_FOUND;

use super::fallback::degrade;
use super::graph::Step;
use super::orchestrator::{ModelSettings, ModelTier};
use super::state::AnalysisState;

/// Words that mark a spreadsheet row as financially relevant.
pub const FINANCIAL_KEYWORDS: [&str; 9] = [
    "revenue",
    "income",
    "expenses",
    "profit",
    "ebitda",
    "assets",
    "liabilities",
    "equity",
    "cash",
];

const NO_TABLES: &str = "No structured tables were extracted.";
const NO_KEYWORDS: &str = "No financial keywords found in the Excel file.";

pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
        && start < end
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}

fn metric_list() -> String {
    KpiMetric::ALL
        .iter()
        .map(|m| format!("- {}", m.key()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn example_output() -> String {
    let example = FinancialKpis {
        revenue: Some(272524.0),
        total_income: Some(281613.0),
        total_expenses: Some(239855.0),
        profit_before_tax: Some(41758.0),
        net_profit: Some(31632.0),
        total_assets: Some(253919.0),
        total_liabilities: Some(42013.0),
        total_equity: Some(211906.0),
        employee_benefit_expense: Some(200175.0),
        cash_and_equivalents: Some(9095.0),
    };
    example.to_canonical_json()
}

/// Renders every parsed table as a labelled markdown block.
pub fn tables_context(tables: &PageTables) -> String {
    let mut out = String::new();
    for (page, page_tables) in tables {
        for (i, table) in page_tables.iter().enumerate() {
            let _ = write!(
                out,
                "--- Parsed Table {} from Page {page} ---\n{}\n\n",
                i + 1,
                table.to_markdown()
            );
        }
    }
    if out.is_empty() {
        NO_TABLES.to_string()
    } else {
        out
    }
}

fn row_matches(row: &[String]) -> bool {
    row.iter().any(|cell| {
        let cell = cell.to_lowercase();
        FINANCIAL_KEYWORDS.iter().any(|k| cell.contains(k))
    })
}

fn render_row(table: &Table, row: &[String]) -> String {
    row.iter()
        .enumerate()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(i, value)| match table.columns.get(i).map(|c| c.trim()) {
            Some(column) if !column.is_empty() => format!("{column}: {value}"),
            _ => value.clone(),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Keeps only rows that mention a financial keyword in any cell, rendered
/// as `column: value` pairs and grouped by sheet.
pub fn relevant_rows(sheets: &Sheets) -> String {
    let mut out = String::new();
    for (name, table) in sheets {
        let rows: Vec<String> = table
            .rows
            .iter()
            .filter(|row| row_matches(row))
            .map(|row| render_row(table, row))
            .filter(|text| !text.is_empty())
            .collect();
        if !rows.is_empty() {
            let _ = write!(
                out,
                "--- Relevant Data from Sheet: {name} ---\n{}\n\n",
                rows.join("\n")
            );
        }
    }
    if out.is_empty() {
        NO_KEYWORDS.to_string()
    } else {
        out
    }
}

fn pdf_prompt(tables: &str, text: &str) -> String {
    format!(
        "You are a meticulous financial analyst. Your task is to extract key financial metrics from \
        the provided data from a company's annual report.\n\
        The data contains both structured tables (if any were parsed) and raw text. You must find \
        the financial data, even if it is only in the raw text.\n\
        Focus on the Standalone Financial Performance for the most recent year (e.g., 2023-24).\n\n\
        Metrics to extract (all values should be in millions, e.g., 272,524):\n{metrics}\n\n\
        Return the result as a clean JSON object with exactly these keys. If a value cannot be \
        found, set its value to null.\n\n\
        Example Output:\n{example}\n\n\
        FULL CONTEXT DATA:\n---\nPARSED TABLE DATA:\n{tables}\n\nRAW TEXT FROM REPORT:\n{text}\n---",
        metrics = metric_list(),
        example = example_output(),
    )
}

fn spreadsheet_prompt(rows: &str) -> String {
    format!(
        "You are a meticulous financial analyst. Your task is to extract key financial metrics from \
        the pre-processed, highly relevant text below, which was extracted from a spreadsheet.\n\n\
        Metrics to extract (all values should be in millions):\n{metrics}\n\n\
        Return the result as a clean JSON object with exactly these keys. If a value cannot be \
        found for a metric based on the text, set its value to null.\n\
        Do not add any commentary or explanation outside of the JSON object.\n\n\
        PRE-PROCESSED DATA:\n---\n{rows}\n---",
        metrics = metric_list(),
    )
}

/// One generation call; transport and parse failures both collapse into
/// `failure`.
async fn request_kpis(
    llm_client: &LlmClient,
    models: &ModelSettings,
    step: Step,
    prompt: String,
    failure: KpiFailure,
) -> KpiData {
    let parsed = match llm_client
        .generate(&models.request(ModelTier::Fast, step, prompt))
        .await
    {
        Ok(resp) => FinancialKpis::from_canonical_json(&extract_json(&resp.content))
            .map_err(anyhow::Error::from),
        Err(err) => Err(err),
    };
    degrade(
        step,
        "kpis",
        parsed.map(KpiData::Extracted),
        KpiData::Unavailable(failure),
    )
}

fn record_outcome(step: Step, kpi_data: &KpiData) {
    let found = KpiMetric::ALL.len() - kpi_data.kpis().missing().len();
    let span = tracing::Span::current();
    span.record("kpis.available", kpi_data.is_available());
    span.record("kpis.found", found);
    PIPELINE_KPIS_FOUND.record(found as f64, &[KeyValue::new("pipeline.stage", step.name())]);
}

#[tracing::instrument(
    name = "pipeline_stage pdf_analyzer",
    skip(llm_client, models, state),
    fields(pipeline.stage = "pdf_analyzer", kpis.available, kpis.found, kpis.tables)
)]
pub async fn extract_pdf_kpis(llm_client: &LlmClient, models: &ModelSettings, state: &mut AnalysisState) {
    let step = Step::ExtractPdfKpis;
    let empty = PageTables::new();
    let tables = state.page_tables.as_ref().unwrap_or(&empty);
    let text = state.extracted_text();
    tracing::Span::current().record("kpis.tables", tables.values().map(Vec::len).sum::<usize>());

    let kpi_data = if state.is_unsupported() || (tables.is_empty() && text.trim().is_empty()) {
        tracing::info!("no extracted evidence, skipping KPI model call");
        match state.kpi_data.take() {
            Some(upstream @ KpiData::Unavailable(_)) => upstream,
            _ => KpiData::Unavailable(KpiFailure::PdfExtraction),
        }
    } else {
        let prompt = pdf_prompt(&tables_context(tables), text);
        request_kpis(llm_client, models, step, prompt, KpiFailure::PdfExtraction).await
    };

    record_outcome(step, &kpi_data);
    state.kpi_data = Some(kpi_data);
}

#[tracing::instrument(
    name = "pipeline_stage excel_analyzer",
    skip(llm_client, models, state),
    fields(pipeline.stage = "excel_analyzer", kpis.available, kpis.found, kpis.sheets)
)]
pub async fn extract_spreadsheet_kpis(
    llm_client: &LlmClient,
    models: &ModelSettings,
    state: &mut AnalysisState,
) {
    let step = Step::ExtractSpreadsheetKpis;
    let kpi_data = match state.structured_tables().filter(|sheets| !sheets.is_empty()) {
        None => KpiData::Unavailable(KpiFailure::NoStructuredData),
        Some(sheets) => {
            tracing::Span::current().record("kpis.sheets", sheets.len());
            let rows = relevant_rows(sheets);
            tracing::debug!(relevant = %rows, "pre-processed spreadsheet rows");
            request_kpis(
                llm_client,
                models,
                step,
                spreadsheet_prompt(&rows),
                KpiFailure::SpreadsheetExtraction,
            )
            .await
        }
    };

    record_outcome(step, &kpi_data);
    state.kpi_data = Some(kpi_data);
}
