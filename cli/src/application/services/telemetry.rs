//! Telemetry use-cases: dependency discovery, metrics connectivity and range
//! queries.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Both servers are reached through the local ends of established tunnels.

use std::time::Duration;

use crate::application::ports::TelemetryClient;
use crate::domain::TelemetryError;
use crate::domain::metrics::{Series, parse_range_result, range_params};
use crate::domain::telemetry::{
    DependencyEdge, TimeWindow, parse_dependencies, parse_query_result_count,
};

const TRACE_SERVICE: &str = "trace server";
const METRICS_SERVICE: &str = "metrics server";

/// Fetch service dependency edges for `window` from the trace server.
///
/// # Errors
///
/// Returns a [`TelemetryError`] if the server is unreachable, answers with a
/// non-2xx status, or returns malformed edges.
pub async fn fetch_dependencies(
    client: &impl TelemetryClient,
    trace_url: &str,
    window: TimeWindow,
) -> Result<Vec<DependencyEdge>, TelemetryError> {
    let url = format!("{}/api/dependencies", trace_url.trim_end_matches('/'));
    let body = client
        .get_json(
            TRACE_SERVICE,
            &url,
            &[
                ("endTs", window.end_ms.to_string()),
                ("lookback", window.lookback_ms().to_string()),
                ("startTs", window.start_ms.to_string()),
            ],
        )
        .await?;
    parse_dependencies(&body)
}

/// Run the `up` instant query and return how many targets answered.
///
/// Zero targets still counts as a working connection.
///
/// # Errors
///
/// Returns a [`TelemetryError`] if the server is unreachable or the query
/// does not succeed.
pub async fn check_metrics(
    client: &impl TelemetryClient,
    metrics_url: &str,
) -> Result<usize, TelemetryError> {
    let url = format!("{}/api/v1/query", metrics_url.trim_end_matches('/'));
    let body = client
        .get_json(METRICS_SERVICE, &url, &[("query", "up".to_string())])
        .await?;
    parse_query_result_count(&body)
}

/// Run `query` over `window` at resolution `step`.
///
/// # Errors
///
/// Returns a [`TelemetryError`] if the server is unreachable, rejects the
/// query, or answers with something other than a matrix.
pub async fn query_range(
    client: &impl TelemetryClient,
    metrics_url: &str,
    query: &str,
    window: TimeWindow,
    step: Duration,
) -> Result<Vec<Series>, TelemetryError> {
    let url = format!("{}/api/v1/query_range", metrics_url.trim_end_matches('/'));
    let body = client
        .get_json(METRICS_SERVICE, &url, &range_params(query, window, step))
        .await?;
    parse_range_result(&body)
}
