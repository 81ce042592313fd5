//! Step ordering for the four workflows.
//!
//! A `Graph` is a table of outgoing transitions keyed by step. Every step
//! declares the state fields it reads and writes, so `check_dependencies` can
//! prove before a run that no step reads a field nothing on its path has
//! written.

use std::fmt;

use thiserror::Error;

use super::state::AnalysisState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Ingest,
    LocateToc,
    ExtractFinancials,
    ExtractPdfKpis,
    ExtractSpreadsheetKpis,
    IdentifyCompany,
    Optimist,
    Realist,
    Skeptic,
    Summarize,
    DeepDive,
    Scenario,
    Benchmark,
}

/// State fields a step can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Document,
    Filename,
    CompanyName,
    Ingested,
    KeyPages,
    PageTables,
    ExtractedText,
    KpiData,
    Debate,
    FinalSummary,
    AnalysisContext,
    DeepDive,
    UserQuery,
    ScenarioResponse,
    BenchmarkAnalysis,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Ingest => "ingestion",
            Step::LocateToc => "toc_analyzer",
            Step::ExtractFinancials => "pdf_extractor",
            Step::ExtractPdfKpis => "pdf_analyzer",
            Step::ExtractSpreadsheetKpis => "excel_analyzer",
            Step::IdentifyCompany => "company_identifier",
            Step::Optimist => "optimist",
            Step::Realist => "realist",
            Step::Skeptic => "skeptic",
            Step::Summarize => "summary",
            Step::DeepDive => "comprehensive_analysis",
            Step::Scenario => "scenario_analyzer",
            Step::Benchmark => "benchmark_analyzer",
        }
    }

    /// Fields that must be populated before the step runs. Fields a step
    /// only reads when present (extracted text for the company step) are
    /// not listed.
    pub fn requires(self) -> &'static [Field] {
        use Field::*;
        match self {
            Step::Ingest => &[Document, Filename],
            Step::LocateToc => &[Ingested],
            Step::ExtractFinancials => &[Document, KeyPages],
            Step::ExtractPdfKpis => &[PageTables, ExtractedText],
            Step::ExtractSpreadsheetKpis => &[Ingested],
            Step::IdentifyCompany => &[Document, Filename],
            Step::Optimist | Step::Realist | Step::Skeptic => &[CompanyName, KpiData],
            Step::Summarize => &[CompanyName, Debate, KpiData],
            Step::DeepDive => &[CompanyName, ExtractedText],
            Step::Scenario => &[CompanyName, KpiData, UserQuery],
            Step::Benchmark => &[CompanyName, KpiData],
        }
    }

    pub fn writes(self) -> &'static [Field] {
        use Field::*;
        match self {
            Step::Ingest => &[Ingested, KpiData],
            Step::LocateToc => &[KeyPages],
            Step::ExtractFinancials => &[PageTables, ExtractedText],
            Step::ExtractPdfKpis | Step::ExtractSpreadsheetKpis => &[KpiData],
            Step::IdentifyCompany => &[CompanyName],
            Step::Optimist | Step::Realist | Step::Skeptic => &[Debate],
            Step::Summarize => &[FinalSummary, AnalysisContext],
            Step::DeepDive => &[DeepDive],
            Step::Scenario => &[ScenarioResponse],
            Step::Benchmark => &[BenchmarkAnalysis],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Predicate = fn(&AnalysisState) -> bool;

#[derive(Clone, Copy)]
pub enum Transition {
    Then(Step),
    Fork {
        label: &'static str,
        predicate: Predicate,
        yes: Step,
        no: Step,
    },
    End,
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Then(step) => write!(f, "Then({step})"),
            Transition::Fork { label, yes, no, .. } => {
                write!(f, "Fork({label}? {yes} : {no})")
            }
            Transition::End => f.write_str("End"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph {graph}: step {step} has no outgoing edge")]
    MissingEdge { graph: &'static str, step: Step },

    #[error("graph {graph}: step {step} entered twice")]
    Reentered { graph: &'static str, step: Step },

    #[error("graph {graph}: step {step} reads {field:?} before anything writes it")]
    MissingInput {
        graph: &'static str,
        step: Step,
        field: Field,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Graph {
    pub name: &'static str,
    pub entry: Step,
    /// Fields the caller populates before the first step.
    pub provided: &'static [Field],
    pub edges: &'static [(Step, Transition)],
}

/// The one decision in the full analysis: did ingestion produce sheets?
pub fn has_structured_tables(state: &AnalysisState) -> bool {
    state
        .structured_tables()
        .is_some_and(|sheets| !sheets.is_empty())
}

pub const FULL_ANALYSIS: Graph = Graph {
    name: "full_analysis",
    entry: Step::Ingest,
    provided: &[Field::Document, Field::Filename],
    edges: &[
        (
            Step::Ingest,
            Transition::Fork {
                label: "structured_data_present",
                predicate: has_structured_tables,
                yes: Step::ExtractSpreadsheetKpis,
                no: Step::LocateToc,
            },
        ),
        (Step::LocateToc, Transition::Then(Step::ExtractFinancials)),
        (Step::ExtractFinancials, Transition::Then(Step::ExtractPdfKpis)),
        (Step::ExtractPdfKpis, Transition::Then(Step::IdentifyCompany)),
        (
            Step::ExtractSpreadsheetKpis,
            Transition::Then(Step::IdentifyCompany),
        ),
        (Step::IdentifyCompany, Transition::Then(Step::Optimist)),
        (Step::Optimist, Transition::Then(Step::Realist)),
        (Step::Realist, Transition::Then(Step::Skeptic)),
        (Step::Skeptic, Transition::Then(Step::Summarize)),
        (Step::Summarize, Transition::End),
    ],
};

pub const DEEP_DIVE: Graph = Graph {
    name: "deep_dive",
    entry: Step::DeepDive,
    provided: &[Field::ExtractedText, Field::CompanyName],
    edges: &[(Step::DeepDive, Transition::End)],
};

pub const SCENARIO: Graph = Graph {
    name: "scenario",
    entry: Step::Scenario,
    provided: &[Field::KpiData, Field::UserQuery, Field::CompanyName],
    edges: &[(Step::Scenario, Transition::End)],
};

pub const BENCHMARK: Graph = Graph {
    name: "benchmark",
    entry: Step::Benchmark,
    provided: &[Field::KpiData, Field::CompanyName],
    edges: &[(Step::Benchmark, Transition::End)],
};

impl Graph {
    pub fn transition(&self, step: Step) -> Option<Transition> {
        self.edges
            .iter()
            .find(|(from, _)| *from == step)
            .map(|(_, transition)| *transition)
    }

    /// Every entry-to-end path, taking both sides of each fork.
    pub fn paths(&self) -> Result<Vec<Vec<Step>>, GraphError> {
        let mut complete = Vec::new();
        let mut pending = vec![vec![self.entry]];

        while let Some(path) = pending.pop() {
            let Some(&last) = path.last() else { continue };
            let successors = match self.transition(last) {
                None => {
                    return Err(GraphError::MissingEdge {
                        graph: self.name,
                        step: last,
                    });
                }
                Some(Transition::End) => {
                    complete.push(path);
                    continue;
                }
                Some(Transition::Then(next)) => vec![next],
                Some(Transition::Fork { yes, no, .. }) => vec![yes, no],
            };

            for next in successors {
                if path.contains(&next) {
                    return Err(GraphError::Reentered {
                        graph: self.name,
                        step: next,
                    });
                }
                let mut extended = path.clone();
                extended.push(next);
                pending.push(extended);
            }
        }

        Ok(complete)
    }

    /// Walks every path and checks each step's inputs against what the
    /// caller provides plus what earlier steps on that path write.
    pub fn check_dependencies(&self) -> Result<(), GraphError> {
        for path in self.paths()? {
            let mut available: Vec<Field> = self.provided.to_vec();
            for step in path {
                if let Some(&field) = step.requires().iter().find(|f| !available.contains(f)) {
                    return Err(GraphError::MissingInput {
                        graph: self.name,
                        step,
                        field,
                    });
                }
                available.extend_from_slice(step.writes());
            }
        }
        Ok(())
    }
}
