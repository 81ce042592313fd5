use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

const DEFAULT_PRICING: &str = include_str!("../../data/pricing.json");

/// USD per million tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct PriceEntry {
    #[allow(dead_code)]
    pub provider: String,
    pub input: f64,
    pub output: f64,
}

#[derive(Deserialize)]
struct PricingFile {
    models: HashMap<String, PriceEntry>,
}

/// Built-in table, replaced by the file at `PRICING_JSON_PATH` when that file
/// parses and is non-empty.
pub static PRICING: LazyLock<HashMap<String, PriceEntry>> = LazyLock::new(|| {
    if let Ok(path) = std::env::var("PRICING_JSON_PATH")
        && !path.is_empty()
    {
        match load_pricing(&path) {
            Some(models) => return models,
            None => tracing::warn!(%path, "pricing override unreadable, using built-in table"),
        }
    }
    parse_pricing(DEFAULT_PRICING).unwrap_or_default()
});

fn load_pricing(path: &str) -> Option<HashMap<String, PriceEntry>> {
    let data = std::fs::read_to_string(path).ok()?;
    parse_pricing(&data)
}

fn parse_pricing(data: &str) -> Option<HashMap<String, PriceEntry>> {
    serde_json::from_str::<PricingFile>(data)
        .ok()
        .map(|f| f.models)
        .filter(|m| !m.is_empty())
}

pub fn calculate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    match PRICING.get(model) {
        Some(entry) => {
            (f64::from(input_tokens) * entry.input / 1_000_000.0)
                + (f64::from(output_tokens) * entry.output / 1_000_000.0)
        }
        None => 0.0,
    }
}

pub static PROVIDER_SERVERS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    HashMap::from([
        ("openai", "api.openai.com"),
        ("anthropic", "api.anthropic.com"),
        ("google", "generativelanguage.googleapis.com"),
        ("ollama", "localhost"),
    ])
});

pub static PROVIDER_PORTS: LazyLock<HashMap<&str, i64>> = LazyLock::new(|| {
    HashMap::from([
        ("openai", 443_i64),
        ("anthropic", 443),
        ("google", 443),
        ("ollama", 11434),
    ])
});
