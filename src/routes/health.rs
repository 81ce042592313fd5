use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "annual-report-analyst",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "llm_provider": state.pipeline.provider_name(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::llm::scripted::ScriptedProvider;
    use crate::pipeline::fixtures::StaticWorkbook;
    use crate::routes::router;
    use crate::routes::test_support::{app_state, body_json};

    #[tokio::test]
    async fn test_health_reports_provider() {
        let provider = Arc::new(ScriptedProvider::new());
        let app = router(app_state(&provider, StaticWorkbook::empty()));

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["llm_provider"], "scripted");
        assert_eq!(body["environment"], "development");
    }
}
