//! `meshbench deps`: service dependency graph from the trace server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ProgressReporter;
use crate::application::services::telemetry::fetch_dependencies;
use crate::domain::telemetry::{DependencyGraph, parse_lookback};
use crate::domain::{TelemetryError, TimeWindow};
use crate::output::{Renderer, json};

/// Arguments for the deps command.
#[derive(Args)]
pub struct DepsArgs {
    /// How far back to look, e.g. 30s, 15m, 1h
    #[arg(long, default_value = "1h")]
    pub lookback: String,

    /// Also write the result as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

/// Fetch and print dependency edges for the requested window.
///
/// # Errors
///
/// Returns an error for an invalid lookback, a missing trace port, an
/// unreachable trace server, or an unwritable `--out` file.
pub async fn run(app: &AppContext, args: &DepsArgs) -> Result<()> {
    let lookback = parse_lookback(&args.lookback)?;
    let config = app.load_config()?;
    let trace_url = config
        .monitoring
        .trace_url()
        .ok_or(TelemetryError::EndpointNotConfigured("trace"))?;

    let window = TimeWindow::ending_at(chrono::Utc::now().timestamp_millis(), lookback);
    let reporter = app.reporter();
    reporter.step(&format!("querying dependencies from {trace_url}"));
    let edges = fetch_dependencies(&app.telemetry, &trace_url, window).await?;

    let graph = DependencyGraph::new(window, edges);

    if let Some(path) = &args.out {
        tokio::fs::write(path, json::to_pretty(&graph)?)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        reporter.success(&format!(
            "wrote {} dependencies to {}",
            graph.dependencies.len(),
            path.display()
        ));
    }

    match app.renderer() {
        Renderer::Human(r) => r.render_dependencies(&graph.dependencies, args.lookback.trim()),
        Renderer::Json(r) => r.render(&graph)?,
    }
    Ok(())
}
