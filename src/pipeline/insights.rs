//! Single-step workflows run against results the caller already holds.

use crate::error::AppError;
use crate::llm::LlmClient;

use super::benchmarks::MarketBenchmarks;
use super::graph::Step;
use super::orchestrator::{ModelSettings, ModelTier};
use super::state::{AnalysisState, DeepDive};

async fn ask(
    llm_client: &LlmClient,
    models: &ModelSettings,
    step: Step,
    prompt: String,
) -> Result<String, AppError> {
    llm_client
        .generate(&models.request(ModelTier::Capable, step, prompt))
        .await
        .map(|resp| resp.content)
        .map_err(|e| AppError::Llm(e.to_string()))
}

#[tracing::instrument(
    name = "pipeline_stage comprehensive_analysis",
    skip(llm_client, models, state),
    fields(pipeline.stage = "comprehensive_analysis", source.chars = state.extracted_text().len())
)]
pub async fn deep_dive(
    llm_client: &LlmClient,
    models: &ModelSettings,
    state: &mut AnalysisState,
) -> Result<(), AppError> {
    let prompt = format!(
        "You are a senior analyst. From the report excerpts for {company}, summarize:\n\
        1. Key Growth Drivers.\n\
        2. Stated Risks.\n\
        3. Future Goals.\n\
        Only use what the excerpts say; if a section is not covered, state that it is not covered.\n\n\
        Source Text:\n---\n{text}\n---",
        company = state.company_name(),
        text = state.extracted_text(),
    );
    let details = ask(llm_client, models, Step::DeepDive, prompt).await?;
    state.deep_dive = Some(DeepDive { details });
    Ok(())
}

#[tracing::instrument(
    name = "pipeline_stage scenario_analyzer",
    skip(llm_client, models, state),
    fields(
        pipeline.stage = "scenario_analyzer",
        scenario.kpis_available = state.kpi_data.as_ref().is_some_and(|d| d.is_available()),
    )
)]
pub async fn scenario(
    llm_client: &LlmClient,
    models: &ModelSettings,
    state: &mut AnalysisState,
) -> Result<(), AppError> {
    let query = state
        .user_query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or("No query provided.");
    let prompt = format!(
        "You are a financial modeling expert for {company}.\n\
        Given a JSON object of key financial data and a \"what-if\" question, calculate the \
        potential impact.\n\
        Show your step-by-step calculation and provide a clear, concise conclusion.\n\
        If the provided data is insufficient to answer the question, state exactly what \
        information is missing instead of assuming values.\n\n\
        KEY FINANCIAL DATA:\n---\n{kpis}\n---\n\n\
        USER'S SCENARIO:\n\"{query}\"",
        company = state.company_name(),
        kpis = state.kpi_text(),
    );
    let response = ask(llm_client, models, Step::Scenario, prompt).await?;
    state.scenario_response = Some(response);
    Ok(())
}

#[tracing::instrument(
    name = "pipeline_stage benchmark_analyzer",
    skip(llm_client, models, benchmarks, state),
    fields(pipeline.stage = "benchmark_analyzer", benchmark.references = benchmarks.entries().len())
)]
pub async fn benchmark(
    llm_client: &LlmClient,
    models: &ModelSettings,
    benchmarks: &MarketBenchmarks,
    state: &mut AnalysisState,
) -> Result<(), AppError> {
    let prompt = format!(
        "You are a market analyst. Compare {company}'s financial data with the provided market \
        benchmarks.\n\
        Provide a bulleted list of insights, citing the source for each benchmark.\n\
        Ground your comparison in the company's specific numbers. If the company data is missing \
        or is an error message, say which comparisons cannot be made.\n\n\
        Company KPIs:\n---\n{kpis}\n---\n\n\
        Market Benchmarks:\n---\n{references}\n---",
        company = state.company_name(),
        kpis = state.kpi_text(),
        references = benchmarks.to_prompt_block(),
    );
    let analysis = ask(llm_client, models, Step::Benchmark, prompt).await?;
    state.benchmark_analysis = Some(analysis);
    Ok(())
}
