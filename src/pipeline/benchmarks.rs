use anyhow::Context;
use serde::{Deserialize, Serialize};

const DEFAULT_BENCHMARKS: &str = include_str!("../../data/market-benchmarks.json");

/// One external market statistic with its citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub name: String,
    pub value: String,
    pub source: String,
}

/// Reference table the benchmark step compares company KPIs against.
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketBenchmarks {
    benchmarks: Vec<Benchmark>,
}

impl MarketBenchmarks {
    pub fn builtin() -> Self {
        Self::from_json(DEFAULT_BENCHMARKS).unwrap_or_default()
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let table: Self = serde_json::from_str(data).context("invalid benchmark table")?;
        if table.benchmarks.is_empty() {
            anyhow::bail!("benchmark table has no entries");
        }
        Ok(table)
    }

    /// The file at `path` when given, otherwise the built-in table.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("reading market benchmarks from {path}"))?;
                Self::from_json(&data)
            }
            None => Ok(Self::builtin()),
        }
    }

    pub fn entries(&self) -> &[Benchmark] {
        &self.benchmarks
    }

    pub fn to_prompt_block(&self) -> String {
        self.benchmarks
            .iter()
            .map(|b| format!("- {}: {} (Source: {})", b.name, b.value, b.source))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = MarketBenchmarks::builtin();
        assert_eq!(table.entries().len(), 2);
        assert_eq!(table.entries()[0].name, "APAC Food Delivery Sector Growth (YoY)");
        assert_eq!(table.entries()[1].value, "85%");
    }

    #[test]
    fn test_prompt_block_cites_sources() {
        let block = MarketBenchmarks::builtin().to_prompt_block();
        assert!(block.contains(
            "- APAC Food Delivery Sector Growth (YoY): 27% (Source: Q3 2024 Food Delivery Market Report)"
        ));
        assert!(block.contains("(Source: Global Commerce Analytics, FY24 Review)"));
    }

    #[test]
    fn test_from_json_rejects_empty_and_malformed() {
        assert!(MarketBenchmarks::from_json(r#"{"benchmarks": []}"#).is_err());
        assert!(MarketBenchmarks::from_json("[]").is_err());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = MarketBenchmarks::load(Some("/nonexistent/benchmarks.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/benchmarks.json"));
        assert_eq!(MarketBenchmarks::load(None).unwrap(), MarketBenchmarks::builtin());
    }
}
