use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;

use crate::config::Config;
use crate::error::AppError;
use crate::extract::{DocumentExtractor, SpreadsheetExtractor};
use crate::llm::{GenerateRequest, LlmClient};
use crate::telemetry::metrics::PIPELINE_RUN_DURATION;

use super::benchmarks::MarketBenchmarks;
use super::graph::{BENCHMARK, DEEP_DIVE, FULL_ANALYSIS, Graph, SCENARIO, Step, Transition};
use super::state::{AnalysisState, DeepDive, Persona};
use super::{company, debate, financial, ingest, insights, kpis, summary, toc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Extraction-style calls: ToC, KPIs, company name.
    Fast,
    /// Debate, summary and the insight workflows.
    Capable,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub fast: String,
    pub capable: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fast: config.llm_model_fast.clone(),
            capable: config.llm_model_capable.clone(),
            temperature: config.default_temperature as f32,
            max_tokens: config.default_max_tokens,
        }
    }

    pub fn request(&self, tier: ModelTier, step: Step, prompt: String) -> GenerateRequest {
        let model = match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Capable => &self.capable,
        };
        GenerateRequest {
            model: model.clone(),
            system: String::new(),
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stage: step.name().to_string(),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            fast: "fast-model".to_string(),
            capable: "capable-model".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// The four workflows over injected collaborators. Built once at startup;
/// every invocation gets its own `AnalysisState`.
pub struct Pipeline {
    llm_client: LlmClient,
    documents: Arc<dyn DocumentExtractor>,
    spreadsheets: Arc<dyn SpreadsheetExtractor>,
    benchmarks: MarketBenchmarks,
    models: ModelSettings,
}

impl Pipeline {
    pub fn new(
        llm_client: LlmClient,
        documents: Arc<dyn DocumentExtractor>,
        spreadsheets: Arc<dyn SpreadsheetExtractor>,
        benchmarks: MarketBenchmarks,
        models: ModelSettings,
    ) -> Self {
        Self {
            llm_client,
            documents,
            spreadsheets,
            benchmarks,
            models,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.llm_client.provider_name()
    }

    pub async fn run_full_analysis(
        &self,
        document: Vec<u8>,
        filename: &str,
    ) -> Result<AnalysisState, AppError> {
        self.run_graph(&FULL_ANALYSIS, AnalysisState::for_document(document, filename))
            .await
    }

    pub async fn run_deep_dive(
        &self,
        extracted_text: &str,
        company_name: &str,
    ) -> Result<DeepDive, AppError> {
        let state = self
            .run_graph(
                &DEEP_DIVE,
                AnalysisState::for_deep_dive(extracted_text, company_name),
            )
            .await?;
        state
            .deep_dive
            .ok_or_else(|| AppError::Pipeline("deep dive produced no analysis".into()))
    }

    pub async fn run_scenario(
        &self,
        kpi_text: &str,
        user_query: &str,
        company_name: &str,
    ) -> Result<String, AppError> {
        let state = self
            .run_graph(
                &SCENARIO,
                AnalysisState::for_scenario(kpi_text, user_query, company_name),
            )
            .await?;
        state
            .scenario_response
            .ok_or_else(|| AppError::Pipeline("scenario produced no response".into()))
    }

    pub async fn run_benchmark(&self, kpi_text: &str, company_name: &str) -> Result<String, AppError> {
        let state = self
            .run_graph(&BENCHMARK, AnalysisState::for_benchmark(kpi_text, company_name))
            .await?;
        state
            .benchmark_analysis
            .ok_or_else(|| AppError::Pipeline("benchmark produced no analysis".into()))
    }

    /// Drives `state` from the graph's entry to `End`, one step at a time.
    #[tracing::instrument(
        name = "pipeline workflow",
        skip(self, graph, state),
        fields(
            workflow = graph.name,
            run.id = %state.run_id,
            run.steps,
            run.duration_ms,
        )
    )]
    async fn run_graph(
        &self,
        graph: &Graph,
        mut state: AnalysisState,
    ) -> Result<AnalysisState, AppError> {
        graph
            .check_dependencies()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let start = Instant::now();
        let mut current = graph.entry;

        let outcome = loop {
            if state.trail.contains(&current) {
                break Err(AppError::Internal(format!(
                    "step {current} entered twice in {}",
                    graph.name
                )));
            }
            state.trail.push(current);

            if let Err(err) = self.run_step(current, &mut state).await {
                break Err(err);
            }

            let next = match graph.transition(current) {
                None => {
                    break Err(AppError::Internal(format!(
                        "step {current} has no outgoing edge in {}",
                        graph.name
                    )));
                }
                Some(Transition::End) => break Ok(()),
                Some(Transition::Then(next)) => next,
                Some(Transition::Fork {
                    label,
                    predicate,
                    yes,
                    no,
                }) => {
                    let taken = predicate(&state);
                    let next = if taken { yes } else { no };
                    tracing::info!(fork = label, taken, next = %next, "routing");
                    next
                }
            };
            tracing::debug!(from = %current, to = %next, "transition");
            current = next;
        };

        let duration = start.elapsed();
        let span = tracing::Span::current();
        span.record("run.steps", state.trail.len());
        span.record("run.duration_ms", duration.as_millis() as u64);
        PIPELINE_RUN_DURATION.record(
            duration.as_secs_f64(),
            &[
                KeyValue::new("pipeline.workflow", graph.name),
                KeyValue::new("pipeline.outcome", if outcome.is_ok() { "ok" } else { "error" }),
            ],
        );

        match outcome {
            Ok(()) => {
                tracing::info!(
                    workflow = graph.name,
                    steps = state.trail.len(),
                    duration_ms = duration.as_millis() as u64,
                    "workflow complete"
                );
                Ok(state)
            }
            Err(err) => {
                tracing::error!(workflow = graph.name, step = %current, error = %err, "workflow failed");
                Err(err)
            }
        }
    }

    async fn run_step(&self, step: Step, state: &mut AnalysisState) -> Result<(), AppError> {
        let llm = &self.llm_client;
        let models = &self.models;
        match step {
            Step::Ingest => ingest::ingest(self.documents.as_ref(), self.spreadsheets.as_ref(), state),
            Step::LocateToc => toc::locate_key_pages(llm, models, state).await?,
            Step::ExtractFinancials => {
                financial::extract_financial_section(self.documents.as_ref(), state)
            }
            Step::ExtractPdfKpis => kpis::extract_pdf_kpis(llm, models, state).await,
            Step::ExtractSpreadsheetKpis => kpis::extract_spreadsheet_kpis(llm, models, state).await,
            Step::IdentifyCompany => {
                company::identify_company(llm, models, self.documents.as_ref(), state).await
            }
            Step::Optimist => debate::argue(llm, models, Persona::Optimist, state).await?,
            Step::Realist => debate::argue(llm, models, Persona::Realist, state).await?,
            Step::Skeptic => debate::argue(llm, models, Persona::Skeptic, state).await?,
            Step::Summarize => summary::summarize(llm, models, state).await?,
            Step::DeepDive => insights::deep_dive(llm, models, state).await?,
            Step::Scenario => insights::scenario(llm, models, state).await?,
            Step::Benchmark => insights::benchmark(llm, models, &self.benchmarks, state).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Table;
    use crate::kpi::{KpiData, KpiFailure, KpiMetric};
    use crate::llm::scripted::{ScriptedProvider, client};
    use crate::pipeline::fixtures::{StaticDocument, StaticWorkbook};
    use crate::pipeline::graph::Field;

    const KPI_ANSWER: &str = r#"{
        "Revenue from operations": 272524,
        "Total Income": 281613,
        "Total Expenses": 239855,
        "Profit before tax": 41758,
        "Profit for the year (Net Profit)": 31632,
        "Total Assets": 253919,
        "Total Liabilities": 42013,
        "Total Equity": 211906,
        "Employee benefit expenses": null,
        "Cash and cash equivalents": null
    }"#;

    fn pipeline(
        provider: &Arc<ScriptedProvider>,
        documents: Arc<dyn DocumentExtractor>,
        workbook: StaticWorkbook,
    ) -> Pipeline {
        Pipeline::new(
            client(provider),
            documents,
            Arc::new(workbook),
            MarketBenchmarks::builtin(),
            ModelSettings::for_tests(),
        )
    }

    fn annual_report() -> Arc<StaticDocument> {
        let mut pages: Vec<String> = vec!["ACME INDUSTRIES LTD Annual Report 2023-24".to_string()];
        pages.extend((2..=70).map(|i| format!("page {i} Revenue from operations")));
        let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
        Arc::new(StaticDocument::pages(&refs).with_table(
            31,
            Table::new(
                vec!["Particulars".to_string(), "FY24".to_string()],
                vec![vec!["Revenue from operations".to_string(), "272524".to_string()]],
            ),
        ))
    }

    fn profit_and_loss() -> StaticWorkbook {
        StaticWorkbook::with_rows(
            "P&L",
            &["Particulars", "FY24"],
            &[&["Revenue from operations", "272524"], &["Net Profit", "31632"]],
        )
    }

    fn assert_ten_keys(state: &AnalysisState) {
        let kpis = state.kpi_data.as_ref().unwrap().kpis();
        let value: serde_json::Value = serde_json::from_str(&kpis.to_canonical_json()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 10);
        for metric in KpiMetric::ALL {
            let v = &obj[metric.key()];
            assert!(v.is_null() || v.is_number(), "{metric}: {v}");
        }
    }

    #[tokio::test]
    async fn test_pdf_run_follows_unstructured_path() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("toc_analyzer", r#"{"financial_statements": 31, "boards_report": 8}"#)
                .on("pdf_analyzer", KPI_ANSWER)
                .on("company_identifier", "Acme Industries Ltd"),
        );
        let document = annual_report();
        let pipeline = pipeline(&provider, document.clone(), StaticWorkbook::empty());

        let state = pipeline
            .run_full_analysis(b"%PDF".to_vec(), "Annual_Report.PDF")
            .await
            .unwrap();

        assert_eq!(
            state.trail,
            vec![
                Step::Ingest,
                Step::LocateToc,
                Step::ExtractFinancials,
                Step::ExtractPdfKpis,
                Step::IdentifyCompany,
                Step::Optimist,
                Step::Realist,
                Step::Skeptic,
                Step::Summarize,
            ]
        );
        assert!(!state.trail.contains(&Step::ExtractSpreadsheetKpis));

        // ToC window, then the 50 pages from the earlier of pages 31 and 8.
        let requested = document.requested();
        assert_eq!(requested[0], (1..=9).collect::<Vec<u32>>());
        assert_eq!(requested[1], (8..58).collect::<Vec<u32>>());

        assert_eq!(state.company_name(), "Acme Industries Ltd");
        assert_ten_keys(&state);
        assert!(state.kpi_data.as_ref().unwrap().is_available());
        assert!(
            provider.prompts_for("pdf_analyzer")[0].contains("--- Parsed Table 1 from Page 31 ---")
        );

        let personas: Vec<Persona> = state.debate.iter().map(|e| e.persona).collect();
        assert_eq!(personas, Persona::ORDER.to_vec());
        assert_eq!(state.final_summary.as_deref(), Some("summary response"));
        assert_eq!(state.analysis_context.as_deref(), Some(&*state.kpi_text()));
    }

    #[tokio::test]
    async fn test_spreadsheet_run_follows_structured_path() {
        let provider = Arc::new(ScriptedProvider::new().on("excel_analyzer", KPI_ANSWER));
        let document = Arc::new(StaticDocument::pages(&[]));
        let pipeline = pipeline(&provider, document.clone(), profit_and_loss());

        let state = pipeline
            .run_full_analysis(b"PK".to_vec(), "Acme_Corp_2024.xlsx")
            .await
            .unwrap();

        assert_eq!(
            state.trail,
            vec![
                Step::Ingest,
                Step::ExtractSpreadsheetKpis,
                Step::IdentifyCompany,
                Step::Optimist,
                Step::Realist,
                Step::Skeptic,
                Step::Summarize,
            ]
        );
        for step in [Step::LocateToc, Step::ExtractFinancials, Step::ExtractPdfKpis] {
            assert!(!state.trail.contains(&step), "{step}");
        }
        assert!(document.requested().is_empty());
        assert!(state.table_of_contents().is_none());
        assert!(state.extracted_text.is_none());
        assert_eq!(state.company_name(), "Acme Corp 2024");
        assert_ten_keys(&state);
        assert!(!provider.stages().contains(&"company_identifier".to_string()));
    }

    #[tokio::test]
    async fn test_unreadable_spreadsheet_routes_to_pdf_path_and_degrades() {
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline(
            &provider,
            Arc::new(StaticDocument::pages(&[])),
            StaticWorkbook::failing(),
        );

        let state = pipeline
            .run_full_analysis(b"PK".to_vec(), "broken.xlsx")
            .await
            .unwrap();

        assert!(state.trail.contains(&Step::LocateToc));
        assert!(!state.trail.contains(&Step::ExtractSpreadsheetKpis));
        assert_eq!(
            state.kpi_data,
            Some(KpiData::Unavailable(KpiFailure::NoStructuredData))
        );
        assert_eq!(state.company_name(), "broken");
        assert_eq!(state.debate.len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_file_completes_with_missing_data_debate() {
        let provider = Arc::new(ScriptedProvider::new().fallback(|req| {
            if req.prompt.contains("Error: Unsupported file type.") {
                Ok(format!("{}: no financial data was available.", req.stage))
            } else {
                Ok(format!("{} response", req.stage))
            }
        }));
        let pipeline = pipeline(
            &provider,
            Arc::new(crate::pipeline::fixtures::FailingDocument),
            StaticWorkbook::empty(),
        );

        let state = pipeline
            .run_full_analysis(b"II*\0".to_vec(), "report.tiff")
            .await
            .unwrap();

        assert!(state.kpi_text().contains("Error"));
        assert_ten_keys(&state);
        assert_eq!(state.company_name(), "The Company");
        assert_eq!(state.debate.len(), 3);
        for entry in &state.debate {
            assert!(entry.text.contains("no financial data was available"), "{entry}");
        }
        // Only the personas and the summary reached the model.
        assert_eq!(
            provider.stages(),
            vec!["optimist", "realist", "skeptic", "summary"]
        );
    }

    #[tokio::test]
    async fn test_unsupported_file_ignores_readable_document() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("pdf_analyzer", KPI_ANSWER)
                .on("company_identifier", "Acme Industries Ltd"),
        );
        let document = annual_report();
        let pipeline = pipeline(&provider, document.clone(), StaticWorkbook::empty());

        let state = pipeline
            .run_full_analysis(b"II*\0".to_vec(), "report.tiff")
            .await
            .unwrap();

        assert!(document.requested().is_empty());
        assert_eq!(
            state.kpi_data,
            Some(KpiData::Unavailable(KpiFailure::UnsupportedFile))
        );
        assert_eq!(state.kpi_text(), "Error: Unsupported file type.");
        assert_eq!(state.extracted_text.as_deref(), Some(""));
        assert_eq!(state.company_name(), "The Company");
        assert_eq!(
            provider.stages(),
            vec!["optimist", "realist", "skeptic", "summary"]
        );
    }

    #[tokio::test]
    async fn test_company_name_from_filename_when_every_call_fails() {
        let provider = Arc::new(ScriptedProvider::failing());
        let pipeline = pipeline(
            &provider,
            Arc::new(StaticDocument::pages(&[])),
            profit_and_loss(),
        );
        let mut state = AnalysisState::for_document(b"PK".to_vec(), "Acme_Corp_2024.xlsx");

        for step in [
            Step::Ingest,
            Step::ExtractSpreadsheetKpis,
            Step::IdentifyCompany,
        ] {
            pipeline.run_step(step, &mut state).await.unwrap();
        }

        assert_eq!(state.company_name.as_deref(), Some("Acme Corp 2024"));
        assert!(!state.kpi_data.as_ref().unwrap().is_available());
        assert_ten_keys(&state);

        // The same provider makes the full run fail at the first persona.
        let err = pipeline
            .run_full_analysis(b"PK".to_vec(), "Acme_Corp_2024.xlsx")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        assert!(err.to_string().contains("The Optimist (CEO) failed"));
    }

    #[tokio::test]
    async fn test_light_workflows_run_a_single_step() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("comprehensive_analysis", "Growth drivers: exports.")
                .on("scenario_analyzer", "Net profit falls to 28,469.")
                .on("benchmark_analyzer", "- Growth trails the sector (Source: ...)"),
        );
        let pipeline = pipeline(
            &provider,
            Arc::new(StaticDocument::pages(&[])),
            StaticWorkbook::empty(),
        );

        let deep_dive = pipeline
            .run_deep_dive("Exports rose 12%.", "Acme Corp")
            .await
            .unwrap();
        assert_eq!(deep_dive.details, "Growth drivers: exports.");

        let answer = pipeline
            .run_scenario(KPI_ANSWER, "What if revenue drops 10%?", "Acme Corp")
            .await
            .unwrap();
        assert_eq!(answer, "Net profit falls to 28,469.");

        let benchmark = pipeline.run_benchmark(KPI_ANSWER, "Acme Corp").await.unwrap();
        assert!(benchmark.starts_with("- Growth trails the sector"));

        assert_eq!(
            provider.stages(),
            vec!["comprehensive_analysis", "scenario_analyzer", "benchmark_analyzer"]
        );
    }

    #[tokio::test]
    async fn test_light_workflow_transport_failure_surfaces() {
        let provider = Arc::new(ScriptedProvider::failing());
        let pipeline = pipeline(
            &provider,
            Arc::new(StaticDocument::pages(&[])),
            StaticWorkbook::empty(),
        );

        let result = pipeline.run_scenario("{}", "What if?", "Acme").await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_misconfigured_graph_is_internal_error() {
        const NO_KPIS: Graph = Graph {
            name: "no_kpis",
            entry: Step::Optimist,
            provided: &[Field::CompanyName],
            edges: &[(Step::Optimist, Transition::End)],
        };
        let provider = Arc::new(ScriptedProvider::new());
        let pipeline = pipeline(
            &provider,
            Arc::new(StaticDocument::pages(&[])),
            StaticWorkbook::empty(),
        );

        let result = pipeline
            .run_graph(&NO_KPIS, AnalysisState::for_benchmark("{}", "Acme"))
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_model_tiers() {
        let models = ModelSettings::for_tests();
        let fast = models.request(ModelTier::Fast, Step::LocateToc, "p".to_string());
        assert_eq!(fast.model, "fast-model");
        assert_eq!(fast.stage, "toc_analyzer");
        let capable = models.request(ModelTier::Capable, Step::Summarize, "p".to_string());
        assert_eq!(capable.model, "capable-model");
        assert_eq!(capable.max_tokens, 1024);
    }
}
