//! Markdown analysis memo assembled from results a client already holds.

use std::fmt::{self, Write};

use serde::Deserialize;

use crate::kpi::KpiData;

const RULE: &str = "---";

#[derive(Debug, Clone, Deserialize)]
pub struct MemoInput {
    pub company_name: String,
    #[serde(default)]
    pub debate: Vec<String>,
    #[serde(default)]
    pub final_summary: Option<String>,
    /// KPI text as returned by `/api/analyze`: canonical JSON or an error line.
    #[serde(default, alias = "cleaned_data")]
    pub kpi_data: String,
}

/// Whole numbers print without a fractional part.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn render_memo(input: &MemoInput) -> String {
    let mut out = String::new();
    // fmt::Write for String never returns an error.
    let _ = write_memo(&mut out, input);
    out
}

fn write_memo(out: &mut String, input: &MemoInput) -> fmt::Result {
    let company = input.company_name.trim();

    writeln!(out, "# Annual Report Analyst: Strategy & Analysis\n")?;
    writeln!(out, "*Independent financial review*\n")?;
    writeln!(out, "{RULE}\n")?;
    writeln!(out, "## Subject: Financial Analysis of {company}\n")?;

    writeln!(out, "# 1. Executive Summary & Final Verdict\n")?;
    match input.final_summary.as_deref().map(str::trim) {
        Some(summary) if !summary.is_empty() => writeln!(out, "{summary}\n")?,
        _ => writeln!(out, "No summary was generated.\n")?,
    }

    writeln!(out, "# 2. Key Financial Metrics Extracted\n")?;
    match KpiData::from_text(&input.kpi_data) {
        KpiData::Extracted(kpis) if !kpis.is_empty() => {
            for (metric, value) in kpis.iter() {
                let value = value.map_or_else(|| "N/A".to_string(), format_value);
                writeln!(out, "- **{metric}:** {value}")?;
            }
            out.push('\n');
        }
        _ => writeln!(
            out,
            "No structured financial KPIs were extracted from the document.\n"
        )?,
    }

    writeln!(out, "# 3. The Boardroom: Analyst Debate Transcript\n")?;
    let entries: Vec<&str> = input
        .debate
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    if entries.is_empty() {
        writeln!(out, "No debate was generated.\n")?;
    } else {
        for entry in entries {
            match entry.split_once(": ") {
                Some((persona, text)) => writeln!(out, "- **{persona}:** {text}")?,
                None => writeln!(out, "- {entry}")?,
            }
        }
        out.push('\n');
    }

    writeln!(out, "{RULE}\n")?;
    writeln!(
        out,
        "*CONFIDENTIAL MEMORANDUM | Generated by the Annual Report Analyst.*"
    )
}
