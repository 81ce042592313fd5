use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::memo::{MemoInput, render_memo};
use crate::pipeline::state::DeepDive;

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub run_id: String,
    pub company_name: String,
    pub debate: Vec<String>,
    pub final_summary: Option<String>,
    pub extracted_text: Option<String>,
    pub analysis_context: Option<String>,
    pub kpi_data: String,
}

#[derive(Debug, Deserialize)]
pub struct DeepDiveBody {
    #[serde(default)]
    pub extracted_text: String,
    pub company_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioBody {
    pub company_name: String,
    pub user_query: String,
    #[serde(default, alias = "cleaned_data")]
    pub kpi_data: String,
}

#[derive(Debug, Deserialize)]
pub struct BenchmarkBody {
    pub company_name: String,
    #[serde(default, alias = "cleaned_data")]
    pub kpi_data: String,
}

fn required<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// `Analysis_<company>.md` with anything outside `[A-Za-z0-9_-]` replaced.
fn report_filename(company: &str) -> String {
    let safe: String = company
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("Analysis_{safe}.md")
}

pub async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<AnalysisResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::Validation("multipart field 'file' is required".into()))?;
    let filename = required(&filename, "filename")?.to_string();

    tracing::info!(filename = %filename, bytes = bytes.len(), "analysis requested");

    let result = state.pipeline.run_full_analysis(bytes, &filename).await?;

    Ok(Json(AnalysisResponse {
        run_id: result.run_id.to_string(),
        company_name: result.company_name().to_string(),
        debate: result.debate_strings(),
        kpi_data: result.kpi_text().into_owned(),
        final_summary: result.final_summary,
        extracted_text: result.extracted_text,
        analysis_context: result.analysis_context,
    }))
}

pub async fn deep_dive(
    State(state): State<AppState>,
    Json(body): Json<DeepDiveBody>,
) -> AppResult<Json<DeepDive>> {
    let company = required(&body.company_name, "company_name")?;
    let details = state
        .pipeline
        .run_deep_dive(&body.extracted_text, company)
        .await?;
    Ok(Json(details))
}

pub async fn scenario(
    State(state): State<AppState>,
    Json(body): Json<ScenarioBody>,
) -> AppResult<Json<Value>> {
    let company = required(&body.company_name, "company_name")?;
    let query = required(&body.user_query, "user_query")?;
    let response = state
        .pipeline
        .run_scenario(&body.kpi_data, query, company)
        .await?;
    Ok(Json(json!({ "response": response })))
}

pub async fn benchmark(
    State(state): State<AppState>,
    Json(body): Json<BenchmarkBody>,
) -> AppResult<Json<Value>> {
    let company = required(&body.company_name, "company_name")?;
    let response = state.pipeline.run_benchmark(&body.kpi_data, company).await?;
    Ok(Json(json!({ "response": response })))
}

pub async fn report(Json(body): Json<MemoInput>) -> AppResult<impl IntoResponse> {
    let filename = report_filename(required(&body.company_name, "company_name")?);
    let memo = render_memo(&body);
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "text/markdown; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        memo,
    ))
}
