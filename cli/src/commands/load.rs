//! `meshbench load`: run the load generator and save what it printed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ProgressReporter;
use crate::application::services::load::run_load;
use crate::domain::load::DEFAULT_LOAD_TIMEOUT;
use crate::domain::{LoadConfig, LoadError, LoadRecord};
use crate::output::{Renderer, json};

/// Arguments for the load command.
#[derive(Args)]
pub struct LoadArgs {
    /// Where to write the run record
    #[arg(long, value_name = "FILE", default_value = "load_output.json")]
    pub out: PathBuf,

    /// Generator argv, overriding load.command from the config file
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Run the generator once and persist a [`LoadRecord`].
///
/// # Errors
///
/// Returns an error if no generator is configured, it cannot be run, it
/// exits non-zero, or the record cannot be written.
pub async fn run(app: &AppContext, args: &LoadArgs) -> Result<()> {
    let config = app.load_config()?;
    let argv = if args.command.is_empty() {
        config
            .load
            .as_ref()
            .map(|l| l.command.clone())
            .ok_or(LoadError::NotConfigured)?
    } else {
        args.command.clone()
    };
    let timeout = config
        .load
        .as_ref()
        .map_or(DEFAULT_LOAD_TIMEOUT, LoadConfig::timeout);

    let reporter = app.reporter();
    let started_ms = chrono::Utc::now().timestamp_millis();
    let run = run_load(&app.runner, &reporter, &argv, timeout).await?;
    let record = LoadRecord::new(
        run.command,
        started_ms,
        chrono::Utc::now().timestamp_millis(),
        run.stdout,
    );

    tokio::fs::write(&args.out, json::to_pretty(&record)?)
        .await
        .with_context(|| format!("cannot write {}", args.out.display()))?;
    reporter.success(&format!("wrote load record to {}", args.out.display()));

    match app.renderer() {
        Renderer::Human(r) => r.render_load(&record, &args.out),
        Renderer::Json(r) => r.render(&record)?,
    }
    Ok(())
}
