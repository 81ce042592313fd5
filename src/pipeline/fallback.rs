use std::fmt::Display;

use opentelemetry::KeyValue;

use super::graph::Step;
use crate::telemetry::metrics::PIPELINE_STEP_DEGRADED;

/// Unwraps `result`, or logs the failure against `step` and returns
/// `fallback`. Every step that can survive a failed extraction or a malformed
/// model answer goes through here.
pub fn degrade<T, E: Display>(step: Step, what: &'static str, result: Result<T, E>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(
                pipeline.stage = step.name(),
                degraded = what,
                error = %err,
                "step degraded to fallback"
            );
            PIPELINE_STEP_DEGRADED.add(
                1,
                &[
                    KeyValue::new("pipeline.stage", step.name()),
                    KeyValue::new("degraded.what", what),
                ],
            );
            fallback
        }
    }
}
