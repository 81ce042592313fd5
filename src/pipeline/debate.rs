use opentelemetry::KeyValue;

use crate::error::AppError;
use crate::llm::LlmClient;
use crate::telemetry::metrics::DEBATE_ENTRIES;

use super::orchestrator::{ModelSettings, ModelTier};
use super::state::{AnalysisState, DebateEntry, Persona};

/// Role and argument contract for a persona; the KPIs go in the user prompt.
fn persona_system(persona: Persona, company: &str) -> String {
    match persona {
        Persona::Optimist => format!(
            "You are an optimistic CEO of {company}.\n\
            Based on the financial KPIs provided, provide a positive and encouraging takeaway for the \
            board.\n\
            You MUST cite specific numbers from the KPIs to support your argument. If any KPIs are \
            'null' or missing, or the KPI data is an error message, acknowledge the data gap as a \
            temporary hiccup but focus on the positive available numbers and the company's strong \
            reputation. Never invent figures that are not in the data."
        ),
        Persona::Realist => format!(
            "You are a pragmatic and realistic CFO of {company}.\n\
            Based on the financial KPIs provided, provide a balanced, data-driven analysis.\n\n\
            Your analysis MUST:\n\
            1. Start by acknowledging any missing data (KPIs with 'null' values, or an error \
            message instead of KPIs) and state what analysis is not possible as a result.\n\
            2. Highlight the company's strengths using the available numbers.\n\
            3. Identify areas that need careful monitoring.\n\
            4. Calculate and cite at least two relevant financial ratios or percentages. For \
            example, calculate the Net Profit Margin (Net Profit / Revenue from operations) or what \
            percentage of Total Expenses is Employee Benefit Expenses.\n\
            5. Cite the original numbers from the KPIs to support all your claims."
        ),
        Persona::Skeptic => format!(
            "You are a skeptical investor analyzing {company}.\n\
            Your job is to find potential weaknesses or red flags in the financial data.\n\n\
            Your analysis MUST:\n\
            1. If any data is missing (KPIs with 'null' values, or an error message instead of \
            KPIs), treat the lack of transparency itself as a major red flag and explain the risks.\n\
            2. Use the available numbers to find concerning trends or metrics.\n\
            3. Calculate and cite at least two key financial ratios or percentages to expose a \
            potential weakness. For example, calculate the company's debt-to-equity ratio (Total \
            Liabilities / Total Equity) or its profit margin.\n\
            4. Cite the original numbers from the KPIs to support your skeptical viewpoint."
        ),
    }
}

/// Runs one persona and appends its entry. Earlier entries are never
/// touched, so running a persona twice yields two entries.
#[tracing::instrument(
    name = "pipeline_stage debate",
    skip(llm_client, models, state),
    fields(
        pipeline.stage = persona.step().name(),
        debate.persona = persona.label(),
        debate.kpis_available = state.kpi_data.as_ref().is_some_and(|d| d.is_available()),
        debate.entries,
    )
)]
pub async fn argue(
    llm_client: &LlmClient,
    models: &ModelSettings,
    persona: Persona,
    state: &mut AnalysisState,
) -> Result<(), AppError> {
    let prompt = format!("Financial KPIs:\n{}", state.kpi_text());
    let request = models
        .request(ModelTier::Capable, persona.step(), prompt)
        .with_system(persona_system(persona, state.company_name()));
    let resp = llm_client
        .generate(&request)
        .await
        .map_err(|e| AppError::Llm(format!("{} failed: {e}", persona.label())))?;

    state.debate.push(DebateEntry {
        persona,
        text: resp.content.trim().to_string(),
    });

    DEBATE_ENTRIES.add(1, &[KeyValue::new("debate.persona", persona.step().name())]);
    tracing::Span::current().record("debate.entries", state.debate.len());
    Ok(())
}
