//! The canonical KPI set shared by every extraction and generation step.
//!
//! `FinancialKpis` always carries all ten metrics; a metric that could not be
//! found is `None` and serialises as an explicit `null`. `KpiData` tags whether
//! extraction produced data at all, so downstream code branches on the variant
//! instead of inspecting the serialised text.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KpiMetric {
    Revenue,
    TotalIncome,
    TotalExpenses,
    ProfitBeforeTax,
    NetProfit,
    TotalAssets,
    TotalLiabilities,
    TotalEquity,
    EmployeeBenefitExpense,
    CashAndEquivalents,
}

impl KpiMetric {
    pub const ALL: [KpiMetric; 10] = [
        KpiMetric::Revenue,
        KpiMetric::TotalIncome,
        KpiMetric::TotalExpenses,
        KpiMetric::ProfitBeforeTax,
        KpiMetric::NetProfit,
        KpiMetric::TotalAssets,
        KpiMetric::TotalLiabilities,
        KpiMetric::TotalEquity,
        KpiMetric::EmployeeBenefitExpense,
        KpiMetric::CashAndEquivalents,
    ];

    /// Key used in the canonical JSON form.
    pub fn key(self) -> &'static str {
        match self {
            KpiMetric::Revenue => "Revenue from operations",
            KpiMetric::TotalIncome => "Total Income",
            KpiMetric::TotalExpenses => "Total Expenses",
            KpiMetric::ProfitBeforeTax => "Profit before tax",
            KpiMetric::NetProfit => "Profit for the year (Net Profit)",
            KpiMetric::TotalAssets => "Total Assets",
            KpiMetric::TotalLiabilities => "Total Liabilities",
            KpiMetric::TotalEquity => "Total Equity",
            KpiMetric::EmployeeBenefitExpense => "Employee benefit expenses",
            KpiMetric::CashAndEquivalents => "Cash and cash equivalents",
        }
    }
}

impl fmt::Display for KpiMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialKpis {
    #[serde(rename = "Revenue from operations", default, deserialize_with = "lenient_number")]
    pub revenue: Option<f64>,
    #[serde(rename = "Total Income", default, deserialize_with = "lenient_number")]
    pub total_income: Option<f64>,
    #[serde(rename = "Total Expenses", default, deserialize_with = "lenient_number")]
    pub total_expenses: Option<f64>,
    #[serde(rename = "Profit before tax", default, deserialize_with = "lenient_number")]
    pub profit_before_tax: Option<f64>,
    #[serde(
        rename = "Profit for the year (Net Profit)",
        default,
        deserialize_with = "lenient_number"
    )]
    pub net_profit: Option<f64>,
    #[serde(rename = "Total Assets", default, deserialize_with = "lenient_number")]
    pub total_assets: Option<f64>,
    #[serde(rename = "Total Liabilities", default, deserialize_with = "lenient_number")]
    pub total_liabilities: Option<f64>,
    #[serde(rename = "Total Equity", default, deserialize_with = "lenient_number")]
    pub total_equity: Option<f64>,
    #[serde(rename = "Employee benefit expenses", default, deserialize_with = "lenient_number")]
    pub employee_benefit_expense: Option<f64>,
    #[serde(rename = "Cash and cash equivalents", default, deserialize_with = "lenient_number")]
    pub cash_and_equivalents: Option<f64>,
}

impl FinancialKpis {
    pub fn get(&self, metric: KpiMetric) -> Option<f64> {
        match metric {
            KpiMetric::Revenue => self.revenue,
            KpiMetric::TotalIncome => self.total_income,
            KpiMetric::TotalExpenses => self.total_expenses,
            KpiMetric::ProfitBeforeTax => self.profit_before_tax,
            KpiMetric::NetProfit => self.net_profit,
            KpiMetric::TotalAssets => self.total_assets,
            KpiMetric::TotalLiabilities => self.total_liabilities,
            KpiMetric::TotalEquity => self.total_equity,
            KpiMetric::EmployeeBenefitExpense => self.employee_benefit_expense,
            KpiMetric::CashAndEquivalents => self.cash_and_equivalents,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (KpiMetric, Option<f64>)> + '_ {
        KpiMetric::ALL.into_iter().map(|m| (m, self.get(m)))
    }

    pub fn missing(&self) -> Vec<KpiMetric> {
        self.iter().filter(|(_, v)| v.is_none()).map(|(m, _)| m).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none())
    }

    pub fn to_canonical_json(&self) -> String {
        // A struct of Option<f64> fields cannot fail to serialise, except for
        // non-finite floats which serde_json writes as null anyway.
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parses any JSON object into the ten-key set. Arrays are rejected even
    /// when they would line up positionally with the fields.
    pub fn from_canonical_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let Some(obj) = value.as_object() else {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "KPI data must be a JSON object",
            ));
        };
        let ignored = non_canonical_keys(obj);
        if !ignored.is_empty() {
            tracing::debug!(?ignored, "dropping non-canonical KPI keys");
        }
        serde_json::from_value(value)
    }
}

fn non_canonical_keys(obj: &Map<String, Value>) -> Vec<&str> {
    obj.keys()
        .map(String::as_str)
        .filter(|key| KpiMetric::ALL.iter().all(|m| m.key() != *key))
        .collect()
}

/// Accepts numbers, numeric strings with thousands separators, and treats
/// every other value as missing.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_text(&s),
        _ => None,
    })
}

fn parse_numeric_text(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '_'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Why no KPI data is available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KpiFailure {
    #[error("Unsupported file type.")]
    UnsupportedFile,

    #[error("No structured data found.")]
    NoStructuredData,

    #[error("Could not extract structured financial data from the PDF.")]
    PdfExtraction,

    #[error("Could not extract structured financial data from the spreadsheet.")]
    SpreadsheetExtraction,

    /// Caller-supplied KPI text that is not in canonical form.
    #[error("{0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KpiData {
    Extracted(FinancialKpis),
    Unavailable(KpiFailure),
}

impl KpiData {
    /// Classifies KPI text handed in by a caller of the lighter workflows.
    pub fn from_text(text: &str) -> Self {
        match FinancialKpis::from_canonical_json(text) {
            Ok(kpis) => KpiData::Extracted(kpis),
            Err(_) => KpiData::Unavailable(KpiFailure::Unreadable(text.to_string())),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, KpiData::Extracted(_))
    }

    /// The full ten-key set; all null when extraction failed.
    pub fn kpis(&self) -> FinancialKpis {
        match self {
            KpiData::Extracted(kpis) => *kpis,
            KpiData::Unavailable(_) => FinancialKpis::default(),
        }
    }

    /// The serialised form every generation prompt reads.
    pub fn canonical_text(&self) -> Cow<'_, str> {
        match self {
            KpiData::Extracted(kpis) => Cow::Owned(kpis.to_canonical_json()),
            KpiData::Unavailable(KpiFailure::Unreadable(text)) => Cow::Borrowed(text.as_str()),
            KpiData::Unavailable(failure) => Cow::Owned(format!("Error: {failure}")),
        }
    }
}
