//! The record threaded through every pipeline step.
//!
//! Each field starts as `None` and is written by exactly one step (or by the
//! caller for the lighter workflows). `Some` of an empty value means the
//! producing step ran and found nothing.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::graph::Step;
use crate::extract::{PageTables, Sheets};
use crate::kpi::KpiData;

pub const DEFAULT_COMPANY_NAME: &str = "The Company";
pub const DEFAULT_START_PAGE: u32 = 8;
pub const SCAN_WINDOW_PAGES: u32 = 50;

/// Result of format-specific ingestion. Holding the ToC text and the
/// workbook sheets in one enum keeps the two branches mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    TableOfContents(String),
    Spreadsheet(Sheets),
    Unsupported,
}

/// Starting pages of the two report sections the ToC step looks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPages {
    #[serde(default, deserialize_with = "positive_page")]
    pub financial_statements: Option<u32>,
    #[serde(default, deserialize_with = "positive_page")]
    pub boards_report: Option<u32>,
}

impl KeyPages {
    pub fn start_page(&self) -> u32 {
        [self.financial_statements, self.boards_report]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(DEFAULT_START_PAGE)
    }

    pub fn scan_window(&self) -> Vec<u32> {
        let start = self.start_page();
        (start..start.saturating_add(SCAN_WINDOW_PAGES)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.financial_statements.is_none() && self.boards_report.is_none()
    }
}

/// Page numbers from the model: positive integers, possibly quoted. Zero,
/// negatives, fractions and anything non-numeric become `None`.
fn positive_page<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let page = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(page
        .filter(|p| *p > 0)
        .and_then(|p| u32::try_from(p).ok()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Persona {
    Optimist,
    Realist,
    Skeptic,
}

impl Persona {
    pub const ORDER: [Persona; 3] = [Persona::Optimist, Persona::Realist, Persona::Skeptic];

    pub fn label(self) -> &'static str {
        match self {
            Persona::Optimist => "The Optimist (CEO)",
            Persona::Realist => "The Realist (CFO)",
            Persona::Skeptic => "The Skeptic (Investor)",
        }
    }

    pub fn step(self) -> Step {
        match self {
            Persona::Optimist => Step::Optimist,
            Persona::Realist => Step::Realist,
            Persona::Skeptic => Step::Skeptic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebateEntry {
    pub persona: Persona,
    pub text: String,
}

impl fmt::Display for DebateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.persona.label(), self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepDive {
    pub details: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub document: Vec<u8>,
    pub filename: String,
    pub company_name: Option<String>,
    pub ingested: Option<Ingested>,
    pub key_pages: Option<KeyPages>,
    pub page_tables: Option<PageTables>,
    pub extracted_text: Option<String>,
    pub kpi_data: Option<KpiData>,
    pub debate: Vec<DebateEntry>,
    pub final_summary: Option<String>,
    pub analysis_context: Option<String>,
    pub deep_dive: Option<DeepDive>,
    pub user_query: Option<String>,
    pub scenario_response: Option<String>,
    pub benchmark_analysis: Option<String>,
    /// Steps visited so far, in order.
    pub trail: Vec<Step>,
}

impl AnalysisState {
    fn empty() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            document: Vec::new(),
            filename: String::new(),
            company_name: None,
            ingested: None,
            key_pages: None,
            page_tables: None,
            extracted_text: None,
            kpi_data: None,
            debate: Vec::new(),
            final_summary: None,
            analysis_context: None,
            deep_dive: None,
            user_query: None,
            scenario_response: None,
            benchmark_analysis: None,
            trail: Vec::new(),
        }
    }

    pub fn for_document(document: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            document,
            filename: filename.into(),
            ..Self::empty()
        }
    }

    pub fn for_deep_dive(extracted_text: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            extracted_text: Some(extracted_text.into()),
            company_name: Some(company_name.into()),
            ..Self::empty()
        }
    }

    pub fn for_scenario(
        kpi_text: &str,
        user_query: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            kpi_data: Some(KpiData::from_text(kpi_text)),
            user_query: Some(user_query.into()),
            company_name: Some(company_name.into()),
            ..Self::empty()
        }
    }

    pub fn for_benchmark(kpi_text: &str, company_name: impl Into<String>) -> Self {
        Self {
            kpi_data: Some(KpiData::from_text(kpi_text)),
            company_name: Some(company_name.into()),
            ..Self::empty()
        }
    }

    pub fn company_name(&self) -> &str {
        self.company_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_COMPANY_NAME)
    }

    /// The cleaned KPI text every generation prompt reads.
    pub fn kpi_text(&self) -> Cow<'_, str> {
        match &self.kpi_data {
            Some(data) => data.canonical_text(),
            None => Cow::Borrowed("{}"),
        }
    }

    pub fn table_of_contents(&self) -> Option<&str> {
        match &self.ingested {
            Some(Ingested::TableOfContents(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn structured_tables(&self) -> Option<&Sheets> {
        match &self.ingested {
            Some(Ingested::Spreadsheet(sheets)) => Some(sheets),
            _ => None,
        }
    }

    /// Ingestion rejected the file type; no document adapter may read it.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.ingested, Some(Ingested::Unsupported))
    }

    pub fn extracted_text(&self) -> &str {
        self.extracted_text.as_deref().unwrap_or("")
    }

    pub fn debate_strings(&self) -> Vec<String> {
        self.debate.iter().map(ToString::to_string).collect()
    }
}
