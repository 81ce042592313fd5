use std::path::Path;

use crate::extract::DocumentExtractor;
use crate::llm::LlmClient;

use super::fallback::degrade;
use super::graph::Step;
use super::ingest::DocumentKind;
use super::orchestrator::{ModelSettings, ModelTier};
use super::state::{AnalysisState, DEFAULT_COMPANY_NAME};

const TEXT_PREFIX_CHARS: usize = 2000;
const COVER_PAGES: [u32; 3] = [1, 2, 3];

/// A bare company name: one line, 4 to 99 characters. Anything else is
/// most likely the model explaining itself.
pub fn accept_name(answer: &str) -> Option<String> {
    let name = answer.trim();
    let len = name.chars().count();
    (len > 3 && len < 100 && !name.contains('\n')).then(|| name.to_string())
}

/// `Acme_Corp-2024.xlsx` becomes `Acme Corp 2024`.
pub fn name_from_filename(filename: &str) -> Option<String> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let name = stem.replace(['_', '-'], " ");
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

async fn ask_for_name(
    llm_client: &LlmClient,
    models: &ModelSettings,
    what: &'static str,
    prompt: String,
) -> Option<String> {
    let answer = degrade(
        Step::IdentifyCompany,
        what,
        llm_client
            .generate(&models.request(ModelTier::Fast, Step::IdentifyCompany, prompt))
            .await
            .map(|resp| resp.content),
        String::new(),
    );
    let accepted = accept_name(&answer);
    if accepted.is_none() && !answer.is_empty() {
        tracing::debug!(source = what, "model answer rejected as a company name");
    }
    accepted
}

/// Tries, in order: the model on the extracted text, the filename of a
/// spreadsheet, the model on the cover pages of a readable document. Stops
/// at the first usable name and falls back to "The Company".
#[tracing::instrument(
    name = "pipeline_stage company_identifier",
    skip(llm_client, models, documents, state),
    fields(pipeline.stage = "company_identifier", company.source, company.name)
)]
pub async fn identify_company(
    llm_client: &LlmClient,
    models: &ModelSettings,
    documents: &dyn DocumentExtractor,
    state: &mut AnalysisState,
) {
    let mut resolved: Option<(String, &'static str)> = None;

    let text = state.extracted_text();
    if !text.trim().is_empty() {
        let excerpt: String = text.chars().take(TEXT_PREFIX_CHARS).collect();
        let prompt = format!(
            "From the following text from an annual report, identify and return ONLY the main \
            company's name. Example: 'Capgemini Technology Services India Limited'.\n\n\
            TEXT:\n{excerpt}"
        );
        resolved = ask_for_name(llm_client, models, "name_from_text", prompt)
            .await
            .map(|name| (name, "extracted_text"));
    }

    if resolved.is_none() && DocumentKind::from_filename(&state.filename) == DocumentKind::Spreadsheet {
        resolved = name_from_filename(&state.filename).map(|name| (name, "filename"));
    }

    if resolved.is_none() && !state.is_unsupported() {
        let cover = degrade(
            Step::IdentifyCompany,
            "cover_text",
            documents.extract_text(&state.document, &COVER_PAGES),
            String::new(),
        );
        if !cover.trim().is_empty() {
            let prompt = format!(
                "From the following text from a report's cover page, identify and return ONLY the \
                main company's name.\n\nTEXT:\n{cover}"
            );
            resolved = ask_for_name(llm_client, models, "name_from_cover", prompt)
                .await
                .map(|name| (name, "cover_pages"));
        }
    }

    let (name, source) =
        resolved.unwrap_or_else(|| (DEFAULT_COMPANY_NAME.to_string(), "default"));

    let span = tracing::Span::current();
    span.record("company.source", source);
    span.record("company.name", name.as_str());
    tracing::info!(company = %name, source, "company identified");

    state.company_name = Some(name);
}
