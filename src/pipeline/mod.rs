//! The analysis workflows: typed state, the step graphs that drive it, and
//! one module per step.

pub mod benchmarks;
pub mod company;
pub mod debate;
pub mod fallback;
pub mod financial;
pub mod graph;
pub mod ingest;
pub mod insights;
pub mod kpis;
pub mod orchestrator;
pub mod state;
pub mod summary;
pub mod toc;

#[cfg(test)]
pub(crate) mod fixtures;

pub use benchmarks::MarketBenchmarks;
pub use orchestrator::{ModelSettings, Pipeline};
pub use state::AnalysisState;
