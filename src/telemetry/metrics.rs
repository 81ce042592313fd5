use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("annual-report-analyst"));

// --- LLM client metrics ---

pub static GEN_AI_TOKEN_USAGE: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.token.usage")
        .with_description("Number of tokens used per LLM call")
        .with_unit("{token}")
        .build()
});

pub static GEN_AI_OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.operation.duration")
        .with_description("Duration of LLM operations in seconds")
        .with_unit("s")
        .build()
});

pub static GEN_AI_COST: LazyLock<Counter<f64>> = LazyLock::new(|| {
    METER
        .f64_counter("gen_ai.client.cost")
        .with_description("Estimated cost of LLM operations in USD")
        .with_unit("usd")
        .build()
});

pub static GEN_AI_ERROR_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.error.count")
        .with_description("Number of LLM call errors")
        .with_unit("{error}")
        .build()
});

// --- Pipeline metrics ---

pub static PIPELINE_RUN_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("pipeline.run.duration")
        .with_description("Duration of one workflow invocation in seconds")
        .with_unit("s")
        .build()
});

pub static PIPELINE_STEP_DEGRADED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("pipeline.step.degraded")
        .with_description("Steps that replaced a failed external call with a fallback value")
        .with_unit("{step}")
        .build()
});

pub static PIPELINE_KPIS_FOUND: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("pipeline.kpis.found")
        .with_description("Canonical KPIs with a value after extraction")
        .with_unit("{kpi}")
        .build()
});

pub static DEBATE_ENTRIES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("pipeline.debate.entries")
        .with_description("Persona entries appended to debate transcripts")
        .with_unit("{entry}")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 15000.0, 30000.0, 60000.0, 120000.0,
            300000.0,
        ])
        .build()
});
