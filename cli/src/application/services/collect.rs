//! Metrics collection: one range query per configured metric over a window,
//! attributed to the services found in trace data.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use crate::application::ports::{ProgressReporter, TelemetryClient};
use crate::application::services::telemetry::query_range;
use crate::domain::TimeWindow;
use crate::domain::metrics::{Collection, MetricQuery, MetricResult, QueryFailure};

/// What to collect and over which range.
#[derive(Debug, Clone, Copy)]
pub struct CollectPlan<'a> {
    pub metrics_url: &'a str,
    pub queries: &'a [MetricQuery],
    pub window: TimeWindow,
    pub step: Duration,
}

/// Run every query in `plan`, in order.
///
/// A failing query is recorded and reported; the remaining queries still
/// run.
pub async fn collect(
    client: &impl TelemetryClient,
    reporter: &impl ProgressReporter,
    services: Vec<String>,
    plan: CollectPlan<'_>,
) -> Collection {
    let mut results = Vec::new();
    let mut failures = Vec::new();
    for q in plan.queries {
        reporter.step(&format!("fetching {}", q.name));
        match query_range(client, plan.metrics_url, &q.query, plan.window, plan.step).await {
            Ok(series) => {
                tracing::debug!(metric = %q.name, series = series.len(), "range query done");
                results.push(MetricResult {
                    name: q.name.clone(),
                    query: q.query.clone(),
                    series,
                });
            }
            Err(e) => {
                reporter.warn(&format!("{}: {e}", q.name));
                failures.push(QueryFailure {
                    name: q.name.clone(),
                    detail: e.to_string(),
                });
            }
        }
    }
    Collection {
        window: plan.window,
        step_secs: plan.step.as_secs(),
        services,
        results,
        failures,
    }
}
