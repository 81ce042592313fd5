use std::env;
use std::str::FromStr;

use anyhow::Context;

/// Local frontend dev servers.
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub llm_provider: String,
    pub llm_model_capable: String,
    pub llm_model_fast: String,
    pub ollama_base_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
    pub default_temperature: f64,
    pub default_max_tokens: u32,
    pub market_benchmarks_path: Option<String>,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset and empty
    /// values fall back to their defaults; malformed numbers are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            port: parse_var(&var, "APP_PORT", 8080)?,
            environment: or("APP_ENVIRONMENT", "development"),
            llm_provider: or("LLM_PROVIDER", "google"),
            llm_model_capable: or("LLM_MODEL_CAPABLE", "gemini-1.5-pro-latest"),
            llm_model_fast: or("LLM_MODEL_FAST", "gemini-1.5-flash-latest"),
            ollama_base_url: or("OLLAMA_BASE_URL", "http://localhost:11434"),
            openai_api_key: var("OPENAI_API_KEY"),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            google_api_key: var("GOOGLE_API_KEY").or_else(|| var("GEMINI_API_KEY")),
            otel_service_name: or("OTEL_SERVICE_NAME", "annual-report-analyst"),
            otel_exporter_endpoint: or("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            default_temperature: parse_var(&var, "DEFAULT_TEMPERATURE", 0.3)?,
            default_max_tokens: parse_var(&var, "DEFAULT_MAX_TOKENS", 4096)?,
            market_benchmarks_path: var("MARKET_BENCHMARKS_PATH"),
            request_timeout_secs: parse_var(&var, "REQUEST_TIMEOUT_SECS", 300)?,
            cors_allowed_origins: or("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ORIGINS)
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}
