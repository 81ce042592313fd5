pub mod analysis;
pub mod health;

use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::AppState;

/// Annual reports routinely exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/analyze", post(analysis::analyze))
        .route("/api/deep-dive", post(analysis::deep_dive))
        .route("/api/scenario", post(analysis::scenario))
        .route("/api/benchmark", post(analysis::benchmark))
        .route("/api/report", post(analysis::report))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Credentialed CORS for the configured frontend origins only.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}


#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Response;
    use serde_json::Value;

    use crate::AppState;
    use crate::config::Config;
    use crate::llm::scripted::{ScriptedProvider, client};
    use crate::pipeline::fixtures::{StaticDocument, StaticWorkbook};
    use crate::pipeline::{MarketBenchmarks, ModelSettings, Pipeline};

    pub fn app_state(provider: &Arc<ScriptedProvider>, workbook: StaticWorkbook) -> AppState {
        let pipeline = Pipeline::new(
            client(provider),
            Arc::new(StaticDocument::pages(&[])),
            Arc::new(workbook),
            MarketBenchmarks::builtin(),
            ModelSettings::for_tests(),
        );
        AppState {
            pipeline: Arc::new(pipeline),
            config: Config::from_lookup(|_| None).unwrap(),
        }
    }

    pub async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }
}
