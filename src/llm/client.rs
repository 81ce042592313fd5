use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::pricing::{PROVIDER_PORTS, PROVIDER_SERVERS, calculate_cost};
use super::{GenerateRequest, GenerateResponse, Provider};
use crate::telemetry::metrics::{
    GEN_AI_COST, GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_TOKEN_USAGE,
};

/// Single-shot generation client. Failures are returned to the caller as-is;
/// there is no retry and no provider fallback.
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    provider_name: String,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, provider_name: impl Into<String>) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let provider_name = self.provider_name.as_str();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let server_addr = PROVIDER_SERVERS
            .get(provider_name)
            .copied()
            .unwrap_or("unknown");
        let server_port = PROVIDER_PORTS.get(provider_name).copied().unwrap_or(443);

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = %server_addr,
            server.port = server_port,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.usage.cost_usd = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            pipeline.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        {
            let mut user_event_attrs =
                vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))];
            if !req.system.is_empty() {
                user_event_attrs.push(KeyValue::new(
                    "gen_ai.system_instructions",
                    truncate(&req.system, 500),
                ));
            }
            span.add_event("gen_ai.user.message", user_event_attrs);
        }

        let result = self.provider.generate(req).instrument(span.clone()).await;

        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.to_string();
                resp.cost_usd = calculate_cost(&resp.model, resp.input_tokens, resp.output_tokens);

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                span.record("gen_ai.usage.cost_usd", resp.cost_usd);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.to_string());
                let model_kv = KeyValue::new("gen_ai.request.model", resp.model.clone());
                let stage_kv = KeyValue::new("pipeline.stage", req.stage.clone());

                for (token_type, count) in [("input", resp.input_tokens), ("output", resp.output_tokens)]
                {
                    GEN_AI_TOKEN_USAGE.record(
                        f64::from(count),
                        &[
                            KeyValue::new("gen_ai.token.type", token_type),
                            op_kv.clone(),
                            provider_kv.clone(),
                            model_kv.clone(),
                            stage_kv.clone(),
                        ],
                    );
                }
                GEN_AI_OPERATION_DURATION.record(
                    duration,
                    &[
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                        stage_kv,
                    ],
                );
                GEN_AI_COST.add(resp.cost_usd, &[op_kv, provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                let error_type = classify_error(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);

                tracing::warn!(
                    provider = provider_name,
                    model = %req.model,
                    stage = %req.stage,
                    error.type = error_type,
                    error = %err,
                    "LLM call failed"
                );

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name.to_string()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("error.type", error_type),
                    ],
                );

                Err(err)
            }
        }
    }
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") || msg.contains("quota") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
