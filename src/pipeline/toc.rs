use crate::error::AppError;
use crate::llm::LlmClient;

use super::fallback::degrade;
use super::graph::Step;
use super::kpis::extract_json;
use super::orchestrator::{ModelSettings, ModelTier};
use super::state::{AnalysisState, KeyPages};

fn toc_prompt(toc_text: &str) -> String {
    format!(
        "You are an expert at reading a Table of Contents from an annual report. From the text below, \
        identify the starting page numbers for the following sections. Prioritize finding \
        'Financial Statements' or 'Standalone Financial Statements'. If not found, look for \
        'Board's Report' or 'Management Discussion'.\n\
        Return the result as a clean JSON object with the keys \"financial_statements\" and \
        \"boards_report\". If a section is not found, its value should be null. \
        Example: {{\"financial_statements\": 31, \"boards_report\": 8}}\n\n\
        Table of Contents Text:\n---\n{toc_text}\n---"
    )
}

pub(crate) fn parse_key_pages(content: &str) -> Result<KeyPages, serde_json::Error> {
    serde_json::from_str(&extract_json(content))
}

#[tracing::instrument(
    name = "pipeline_stage toc_analyzer",
    skip(llm_client, models, state),
    fields(
        pipeline.stage = "toc_analyzer",
        toc.financial_statements,
        toc.boards_report,
        toc.start_page,
    )
)]
pub async fn locate_key_pages(
    llm_client: &LlmClient,
    models: &ModelSettings,
    state: &mut AnalysisState,
) -> Result<(), AppError> {
    let toc_text = state.table_of_contents().unwrap_or("").trim();

    let key_pages = if toc_text.is_empty() {
        tracing::info!("no table of contents text, using default start page");
        KeyPages::default()
    } else {
        let resp = llm_client
            .generate(&models.request(ModelTier::Fast, Step::LocateToc, toc_prompt(toc_text)))
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;
        degrade(
            Step::LocateToc,
            "key_pages",
            parse_key_pages(&resp.content),
            KeyPages::default(),
        )
    };

    let span = tracing::Span::current();
    if let Some(page) = key_pages.financial_statements {
        span.record("toc.financial_statements", page);
    }
    if let Some(page) = key_pages.boards_report {
        span.record("toc.boards_report", page);
    }
    span.record("toc.start_page", key_pages.start_page());

    state.key_pages = Some(key_pages);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::scripted::{ScriptedProvider, client};
    use crate::pipeline::state::Ingested;

    fn pdf_state(toc: &str) -> AnalysisState {
        let mut state = AnalysisState::for_document(b"%PDF".to_vec(), "annual.pdf");
        state.ingested = Some(Ingested::TableOfContents(toc.to_string()));
        state
    }

    #[test]
    fn test_parse_key_pages_from_fenced_block() {
        let pages = parse_key_pages(
            "```json\n{\"financial_statements\": 31, \"boards_report\": 8}\n```",
        )
        .unwrap();
        assert_eq!(pages.financial_statements, Some(31));
        assert_eq!(pages.boards_report, Some(8));
    }

    #[test]
    fn test_parse_key_pages_rejects_prose() {
        assert!(parse_key_pages("The financial statements begin on page 31.").is_err());
    }

    #[tokio::test]
    async fn test_model_answer_sets_key_pages() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "toc_analyzer",
            r#"{"financial_statements": 31, "boards_report": 8}"#,
        ));
        let mut state = pdf_state("Board's Report ..... 8\nFinancial Statements ..... 31");

        locate_key_pages(&client(&provider), &ModelSettings::for_tests(), &mut state)
            .await
            .unwrap();

        let pages = state.key_pages.unwrap();
        assert_eq!(pages.start_page(), 8);
        assert!(provider.prompts_for("toc_analyzer")[0].contains("Financial Statements ..... 31"));
    }

    #[tokio::test]
    async fn test_malformed_answer_falls_back_to_empty_pages() {
        let provider = Arc::new(
            ScriptedProvider::new().on("toc_analyzer", "I could not find a table of contents."),
        );
        let mut state = pdf_state("Contents");

        locate_key_pages(&client(&provider), &ModelSettings::for_tests(), &mut state)
            .await
            .unwrap();

        assert_eq!(state.key_pages, Some(KeyPages::default()));
        assert_eq!(state.key_pages.unwrap().start_page(), 8);
    }

    #[tokio::test]
    async fn test_blank_toc_skips_model() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut state = pdf_state("   \n\t");

        locate_key_pages(&client(&provider), &ModelSettings::for_tests(), &mut state)
            .await
            .unwrap();

        assert!(provider.calls().is_empty());
        assert_eq!(state.key_pages, Some(KeyPages::default()));
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::failing());
        let mut state = pdf_state("Contents");

        let err = locate_key_pages(&client(&provider), &ModelSettings::for_tests(), &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        assert!(state.key_pages.is_none());
    }
}
