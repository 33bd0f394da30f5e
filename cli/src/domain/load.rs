//! Load-generator invocation and the record kept after each run.
//!
//! The generator is an opaque program: its argv comes from configuration and
//! its stdout is stored verbatim.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::LoadError;
use crate::domain::telemetry::TimeWindow;
use crate::domain::tunnel::CommandLine;

/// Margin added around a load run when deriving its collection window.
pub const WINDOW_MARGIN: Duration = Duration::from_secs(10);

/// Upper bound on a load run when the config does not set one.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(900);

/// `load` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Program followed by its arguments, e.g.
    /// `[wrk, -t2, -c100, -d30s, -R2000, http://localhost:8080/]`.
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LoadConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_LOAD_TIMEOUT.as_secs()
}

/// Split an argv into program and arguments.
///
/// # Errors
///
/// Returns [`LoadError::NotConfigured`] when `argv` is empty or its first
/// element is blank.
pub fn load_command(argv: &[String]) -> Result<CommandLine, LoadError> {
    let (program, args) = argv.split_first().ok_or(LoadError::NotConfigured)?;
    if program.trim().is_empty() {
        return Err(LoadError::NotConfigured);
    }
    Ok(CommandLine {
        program: program.clone(),
        args: args.to_vec(),
    })
}

/// What a finished load run leaves on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRecord {
    pub command: Vec<String>,
    pub started_ms: i64,
    pub finished_ms: i64,
    /// Run bounds widened by [`WINDOW_MARGIN`]; `collect --window-from`
    /// queries exactly this range.
    pub window: TimeWindow,
    /// Generator stdout, unparsed.
    pub output: String,
}

impl LoadRecord {
    #[must_use]
    pub fn new(command: Vec<String>, started_ms: i64, finished_ms: i64, output: String) -> Self {
        let window = TimeWindow {
            start_ms: started_ms,
            end_ms: finished_ms,
        }
        .padded(WINDOW_MARGIN);
        Self {
            command,
            started_ms,
            finished_ms,
            window,
            output,
        }
    }

    /// Run duration, zero if the clock went backwards.
    #[must_use]
    pub fn duration(&self) -> Duration {
        let ms = self.finished_ms.saturating_sub(self.started_ms);
        Duration::from_millis(u64::try_from(ms).unwrap_or(0))
    }
}
