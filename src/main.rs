use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, Response, StatusCode};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use annual_report_analyst::AppState;
use annual_report_analyst::config::Config;
use annual_report_analyst::extract::pdf::PdfExtractor;
use annual_report_analyst::extract::spreadsheet::WorkbookExtractor;
use annual_report_analyst::llm::{self, LlmClient};
use annual_report_analyst::pipeline::{MarketBenchmarks, ModelSettings, Pipeline};
use annual_report_analyst::routes;
use annual_report_analyst::telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL, init_telemetry};

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let path = request.uri().path();

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{} {}", method, path),
            http.method = %method,
            http.route = %path,
            http.target = %request.uri(),
            http.scheme = "http",
            http.flavor = ?request.version(),
            http.user_agent = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();

        span.record("http.response.status_code", status as i64);
        span.record("otel.status_code", if status >= 500 { "ERROR" } else { "OK" });

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let attributes = [
            KeyValue::new("http.status_code", status.to_string()),
            KeyValue::new("http.status_class", format!("{}xx", status / 100)),
        ];

        HTTP_REQUESTS_TOTAL.add(1, &attributes);
        HTTP_REQUEST_DURATION.record(latency_ms, &attributes);

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting annual-report-analyst"
    );

    let benchmarks = MarketBenchmarks::load(config.market_benchmarks_path.as_deref())?;
    tracing::info!(references = benchmarks.entries().len(), "market benchmarks loaded");

    let provider = llm::provider_from_config(&config);
    let models = ModelSettings::from_config(&config);
    tracing::info!(
        provider = %config.llm_provider,
        fast_model = %models.fast,
        capable_model = %models.capable,
        "LLM client initialized"
    );

    let pipeline = Pipeline::new(
        LlmClient::new(provider, config.llm_provider.clone()),
        Arc::new(PdfExtractor::new()),
        Arc::new(WorkbookExtractor::new()),
        benchmarks,
        models,
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    let app = routes::router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(routes::cors_layer(&config.cors_allowed_origins)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
