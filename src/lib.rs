//! Annual-report analysis service: KPI extraction from PDF and spreadsheet
//! reports, a three-persona debate over the extracted figures, and follow-up
//! deep-dive, scenario and benchmark workflows.

pub mod config;
pub mod error;
pub mod extract;
pub mod kpi;
pub mod llm;
pub mod memo;
pub mod pipeline;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use config::Config;
use pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Config,
}
