use crate::error::AppError;
use crate::llm::LlmClient;

use super::graph::Step;
use super::orchestrator::{ModelSettings, ModelTier};
use super::state::AnalysisState;

fn summary_prompt(company: &str, debate: &str) -> String {
    format!(
        "Summarize the following debate about {company} into a final, actionable investment memo. \
        Synthesize the optimistic, realistic, and skeptical viewpoints into a balanced conclusion. \
        Where the debaters point out missing financial data, say so plainly instead of filling the \
        gap.\n\nDEBATE:\n{debate}"
    )
}

#[tracing::instrument(
    name = "pipeline_stage summary",
    skip(llm_client, models, state),
    fields(pipeline.stage = "summary", summary.debate_entries = state.debate.len(), summary.chars)
)]
pub async fn summarize(
    llm_client: &LlmClient,
    models: &ModelSettings,
    state: &mut AnalysisState,
) -> Result<(), AppError> {
    let debate = state.debate_strings().join("\n");
    let prompt = summary_prompt(state.company_name(), &debate);

    let resp = llm_client
        .generate(&models.request(ModelTier::Capable, Step::Summarize, prompt))
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    tracing::Span::current().record("summary.chars", resp.content.chars().count());
    state.final_summary = Some(resp.content);
    state.analysis_context = Some(state.kpi_text().into_owned());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::scripted::{ScriptedProvider, client};
    use crate::pipeline::state::{DebateEntry, Persona};

    #[tokio::test]
    async fn test_summary_reads_debate_in_order_and_copies_kpi_text() {
        let provider = Arc::new(ScriptedProvider::new().on("summary", "Hold. Margins are thin."));
        let mut state = AnalysisState::for_benchmark(r#"{"Total Equity": 5}"#, "Acme Corp");
        for (persona, text) in [
            (Persona::Optimist, "Great year."),
            (Persona::Realist, "Margins are 4%."),
            (Persona::Skeptic, "Debt is rising."),
        ] {
            state.debate.push(DebateEntry {
                persona,
                text: text.to_string(),
            });
        }

        summarize(&client(&provider), &ModelSettings::for_tests(), &mut state)
            .await
            .unwrap();

        assert_eq!(state.final_summary.as_deref(), Some("Hold. Margins are thin."));
        assert_eq!(state.analysis_context.as_deref(), Some(&*state.kpi_text()));

        let prompt = &provider.prompts_for("summary")[0];
        let optimist = prompt.find("The Optimist (CEO): Great year.").unwrap();
        let realist = prompt.find("The Realist (CFO): Margins are 4%.").unwrap();
        let skeptic = prompt.find("The Skeptic (Investor): Debt is rising.").unwrap();
        assert!(optimist < realist && realist < skeptic);
        assert!(prompt.contains("about Acme Corp"));
    }

    #[tokio::test]
    async fn test_summary_transport_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::failing());
        let mut state = AnalysisState::for_benchmark("{}", "Acme Corp");

        let err = summarize(&client(&provider), &ModelSettings::for_tests(), &mut state)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Llm(_)));
        assert!(state.final_summary.is_none());
    }
}
