//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`; never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::{ExitStatus, Output};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::domain::{MeshbenchConfig, PortState, TelemetryError, TunnelError};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Handle to a process left running in the background.
#[allow(async_fn_in_trait)]
pub trait BackgroundChild {
    /// OS process id, if the process has not been reaped yet.
    fn id(&self) -> Option<u32>;
    /// Non-blocking exit check: `Some(status)` once the process has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the process table cannot be queried.
    fn try_exit(&mut self) -> Result<Option<ExitStatus>>;
    /// Drain the captured error stream. Only call after the process exited.
    async fn stderr_text(&mut self) -> String;
}

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    type Child: BackgroundChild;

    /// Run a program to completion and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Run a program that daemonizes itself (e.g. `ssh -f`) and return once
    /// the launch command exits. Stdout is never captured; stderr is only
    /// captured when the launch fails, since a forked child may hold the
    /// pipe open indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    async fn run_detached(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Spawn a long-lived background process. The process must outlive the
    /// returned handle and the current run.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn_background(&self, program: &str, args: &[&str]) -> Result<Self::Child>;
}

// ── Port Probe Port ───────────────────────────────────────────────────────────

/// Queries the OS socket table for a TCP port.
///
/// Implementations must return [`TunnelError::ProbeUnavailable`] when the
/// underlying tool cannot run; an empty set always means "free".
#[allow(async_fn_in_trait)]
pub trait PortProbe {
    /// PIDs with a socket on `port`, possibly empty.
    async fn owning_pids(&self, port: u16) -> Result<BTreeSet<u32>, TunnelError>;

    /// Current state of `port`.
    async fn state(&self, port: u16) -> Result<PortState, TunnelError> {
        Ok(PortState::from_pids(self.owning_pids(port).await?))
    }

    /// Whether nothing holds `port`.
    async fn is_free(&self, port: u16) -> Result<bool, TunnelError> {
        Ok(self.owning_pids(port).await?.is_empty())
    }
}

// ── Signal Port ───────────────────────────────────────────────────────────────

/// Forceful process termination.
pub trait Signaller {
    /// Deliver SIGKILL (or the platform equivalent) to `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    fn kill(&self, pid: u32) -> Result<()>;
}

// ── Clock Port ────────────────────────────────────────────────────────────────

/// Time source for the bounded poll loops, injectable so tests can
/// fast-forward instead of sleeping.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait; no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Config Port ───────────────────────────────────────────────────────────────

/// Loads the tunnel configuration.
pub trait ConfigStore {
    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparsable, or
    /// fails validation.
    fn load(&self) -> Result<MeshbenchConfig>;
    /// Location the configuration is read from.
    ///
    /// # Errors
    ///
    /// Returns an error if no location can be determined.
    fn path(&self) -> Result<PathBuf>;
}

// ── Telemetry Port ────────────────────────────────────────────────────────────

/// HTTP access to the trace and metrics servers.
#[allow(async_fn_in_trait)]
pub trait TelemetryClient {
    /// `GET url?query` and decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Unreachable`] on transport failure,
    /// [`TelemetryError::HttpStatus`] on a non-2xx answer, and
    /// [`TelemetryError::Payload`] when the body is not JSON.
    async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, TelemetryError>;
}
