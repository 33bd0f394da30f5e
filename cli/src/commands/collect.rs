//! `meshbench collect`: range queries for the services seen in trace data.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::application::ports::ProgressReporter;
use crate::application::services::collect::{CollectPlan, collect};
use crate::application::services::telemetry::fetch_dependencies;
use crate::domain::metrics::QueryFailure;
use crate::domain::telemetry::{DependencyGraph, parse_lookback, parse_step};
use crate::domain::{LoadRecord, TelemetryError, TimeWindow};
use crate::output::{Renderer, json};

/// Arguments for the collect command.
#[derive(Args)]
pub struct CollectArgs {
    /// Window ending now, e.g. 15m [default: collect.lookback]
    #[arg(long, conflicts_with = "window_from")]
    pub lookback: Option<String>,

    /// Query the window recorded by `meshbench load`
    #[arg(long, value_name = "FILE")]
    pub window_from: Option<PathBuf>,

    /// Query resolution, e.g. 15s [default: collect.step]
    #[arg(long)]
    pub step: Option<String>,

    /// Output directory [default: collect.out_dir]
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct CollectSummary<'a> {
    out_dir: &'a Path,
    window: TimeWindow,
    services: &'a [String],
    files: &'a [PathBuf],
    failures: &'a [QueryFailure],
}

/// Discover services, run every configured query and write the results.
/// Returns 1 if any query failed.
///
/// # Errors
///
/// Returns an error for an invalid window or step, a missing monitoring port,
/// an unreachable trace server, or an unwritable output directory.
pub async fn run(app: &AppContext, args: &CollectArgs) -> Result<i32> {
    let config = app.load_config()?;
    let settings = &config.collect;
    let step = parse_step(args.step.as_deref().unwrap_or(&settings.step))?;
    let window = match &args.window_from {
        Some(path) => recorded_window(path).await?,
        None => {
            let lookback = parse_lookback(args.lookback.as_deref().unwrap_or(&settings.lookback))?;
            TimeWindow::ending_at(chrono::Utc::now().timestamp_millis(), lookback)
        }
    };
    let metrics_url = config
        .monitoring
        .metrics_url()
        .ok_or(TelemetryError::EndpointNotConfigured("metrics"))?;
    let trace_url = config
        .monitoring
        .trace_url()
        .ok_or(TelemetryError::EndpointNotConfigured("trace"))?;
    let out_dir = args.out_dir.as_ref().unwrap_or(&settings.out_dir);

    let reporter = app.reporter();
    reporter.step(&format!("discovering services from {trace_url}"));
    let edges = fetch_dependencies(&app.telemetry, &trace_url, window).await?;
    let graph = DependencyGraph::new(window, edges);
    if graph.services.is_empty() {
        reporter.warn("trace server reported no services; writing aggregate files only");
    }

    let plan = CollectPlan {
        metrics_url: &metrics_url,
        queries: &settings.queries,
        window,
        step,
    };
    let collection = collect(&app.telemetry, &reporter, graph.services.clone(), plan).await;

    let mut written = vec![write_json(out_dir, Path::new("dependencies.json"), &graph).await?];
    for file in collection.files(&settings.service_label) {
        written.push(write_json(out_dir, &file.path, &file.content).await?);
    }
    reporter.success(&format!("wrote {} files to {}", written.len(), out_dir.display()));

    match app.renderer() {
        Renderer::Human(r) => r.render_collection(&collection, &written),
        Renderer::Json(r) => r.render(&CollectSummary {
            out_dir,
            window,
            services: &collection.services,
            files: &written,
            failures: &collection.failures,
        })?,
    }
    Ok(i32::from(!collection.failures.is_empty()))
}

async fn recorded_window(path: &Path) -> Result<TimeWindow> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let record: LoadRecord = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a load record", path.display()))?;
    Ok(record.window)
}

async fn write_json(dir: &Path, relative: &Path, value: &impl Serialize) -> Result<PathBuf> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    tokio::fs::write(&path, json::to_pretty(value)?)
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}
