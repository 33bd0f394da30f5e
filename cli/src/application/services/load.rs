//! Load generation: run the configured generator once and capture its output.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use crate::application::ports::{CommandRunner, ProgressReporter};
use crate::domain::LoadError;
use crate::domain::load::load_command;

/// Captured result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRun {
    pub command: Vec<String>,
    pub stdout: String,
}

/// Run the generator named by `argv` to completion.
///
/// The process is killed if it outlives `timeout`.
///
/// # Errors
///
/// - [`LoadError::NotConfigured`] if `argv` names no program.
/// - [`LoadError::Launch`] if it cannot be spawned or times out.
/// - [`LoadError::Failed`] if it exits non-zero.
pub async fn run_load(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    argv: &[String],
    timeout: Duration,
) -> Result<LoadRun, LoadError> {
    let cmd = load_command(argv)?;
    reporter.step(&format!("running load generator: {}", cmd.display()));

    let output = runner
        .run_with_timeout(&cmd.program, &cmd.arg_refs(), timeout)
        .await
        .map_err(|e| LoadError::Launch {
            program: cmd.program.clone(),
            reason: format!("{e:#}"),
        })?;

    if !output.status.success() {
        return Err(LoadError::Failed {
            program: cmd.program,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    reporter.success(&format!("{} finished", cmd.program));
    Ok(LoadRun {
        command: argv.to_vec(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}
