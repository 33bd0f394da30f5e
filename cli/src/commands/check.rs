//! `meshbench check`: verify the metrics and trace servers answer.

use anyhow::Result;
use serde::Serialize;

use crate::app::AppContext;
use crate::application::ports::TelemetryClient;
use crate::application::services::telemetry::{check_metrics, fetch_dependencies};
use crate::domain::{EndpointCheck, MonitoringConfig, TelemetryError, TimeWindow};
use crate::output::Renderer;

const METRICS: &str = "metrics server";
const TRACES: &str = "trace server";
/// Window used to prove the dependencies API responds.
const PROBE_LOOKBACK: std::time::Duration = std::time::Duration::from_secs(300);

#[derive(Serialize)]
struct CheckOutput<'a> {
    ok: bool,
    endpoints: &'a [EndpointCheck],
}

/// Check both telemetry endpoints. Returns 1 if either fails.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub async fn run(app: &AppContext) -> Result<i32> {
    let config = app.load_config()?;
    let checks = vec![
        metrics_check(&app.telemetry, &config.monitoring).await,
        trace_check(&app.telemetry, &config.monitoring).await,
    ];
    let ok = checks.iter().all(|c| c.ok);

    match app.renderer() {
        Renderer::Human(r) => r.render_check(&checks),
        Renderer::Json(r) => r.render(&CheckOutput {
            ok,
            endpoints: &checks,
        })?,
    }
    Ok(i32::from(!ok))
}

async fn metrics_check(
    client: &impl TelemetryClient,
    monitoring: &MonitoringConfig,
) -> EndpointCheck {
    let Some(url) = monitoring.metrics_url() else {
        let err = TelemetryError::EndpointNotConfigured("metrics");
        return EndpointCheck::failed(METRICS, None, &err);
    };
    match check_metrics(client, &url).await {
        Ok(n) => EndpointCheck::passed(METRICS, url, format!("query 'up' returned {n} series")),
        Err(e) => EndpointCheck::failed(METRICS, Some(url), &e),
    }
}

async fn trace_check(
    client: &impl TelemetryClient,
    monitoring: &MonitoringConfig,
) -> EndpointCheck {
    let Some(url) = monitoring.trace_url() else {
        let err = TelemetryError::EndpointNotConfigured("trace");
        return EndpointCheck::failed(TRACES, None, &err);
    };
    let now = chrono::Utc::now().timestamp_millis();
    let window = TimeWindow::ending_at(now, PROBE_LOOKBACK);
    match fetch_dependencies(client, &url, window).await {
        Ok(edges) => EndpointCheck::passed(
            TRACES,
            url,
            format!("{} dependencies in the last 5m", edges.len()),
        ),
        Err(e) => EndpointCheck::failed(TRACES, Some(url), &e),
    }
}
