//! Application context: unified state passed to every command handler.
//!
//! `AppContext` owns the infrastructure adapters once per invocation so that
//! command handlers only borrow them when wiring application services.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::MeshbenchConfig;
use crate::infra::clock::TokioClock;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::infra::port_probe::LsofPortProbe;
use crate::infra::signal::NixSignaller;
use crate::infra::telemetry::UreqTelemetryClient;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Process execution for lsof, ssh and kubectl.
    pub runner: TokioCommandRunner,
    pub signaller: NixSignaller,
    pub clock: TokioClock,
    /// HTTP client for the trace and metrics servers.
    pub telemetry: UreqTelemetryClient,
    config_store: YamlConfigStore,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// JSON mode implies quiet progress output so stdout carries only the
    /// JSON document.
    #[must_use]
    pub fn new(flags: AppFlags) -> Self {
        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Self {
            output: OutputContext::new(flags.no_color, flags.quiet || flags.json),
            mode,
            runner: TokioCommandRunner::default(),
            signaller: NixSignaller,
            clock: TokioClock,
            telemetry: UreqTelemetryClient::default(),
            config_store: YamlConfigStore::new(flags.config),
        }
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter bound to this context's output settings.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// lsof probe sharing this context's command runner.
    #[must_use]
    pub fn probe(&self) -> LsofPortProbe<'_, TokioCommandRunner> {
        LsofPortProbe::new(&self.runner, self.runner.default_timeout())
    }

    /// Load and validate the tunnel configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparsable, or invalid.
    pub fn load_config(&self) -> Result<MeshbenchConfig> {
        self.config_store.load()
    }
}
