//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use thiserror::Error;

// ── Tunnel errors ─────────────────────────────────────────────────────────────

/// Errors raised while probing, reaping, or binding a tunnel's local port.
///
/// Only [`TunnelError::ProbeUnavailable`] is fatal for a whole batch; every
/// other variant is scoped to the single tunnel it names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    #[error("port probe unavailable: {reason}. Is `lsof` installed?")]
    ProbeUnavailable { reason: String },

    #[error("port {port} still occupied after {}s", timeout.as_secs())]
    PortStillOccupied { port: u16, timeout: Duration },

    #[error("relay forward on port {port} failed: {reason}")]
    RelayLaunch { port: u16, reason: String },

    #[error("cluster forward on port {port} could not be launched: {reason}")]
    ForwardLaunch { port: u16, reason: String },

    #[error("cluster forward on port {port} exited early ({}): {stderr}", exit_code_display(*code))]
    ProcessExitedEarly {
        port: u16,
        code: Option<i32>,
        stderr: String,
    },

    #[error("cluster forward on port {port} not listening after {}s", timeout.as_secs())]
    ForwardNotVerified { port: u16, timeout: Duration },
}

impl TunnelError {
    /// Whether the error invalidates every decision in the current batch.
    #[must_use]
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::ProbeUnavailable { .. })
    }
}

fn exit_code_display(code: Option<i32>) -> String {
    code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"))
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to tunnel configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration found at {path}. Create it or pass --config <file>.")]
    NotFound { path: String },

    #[error("Relay {field} must not be empty.")]
    EmptyRelayField { field: &'static str },

    #[error("Tunnel #{index}: local_port must be non-zero.")]
    ZeroPort { index: usize },

    #[error("Tunnel #{index}: local_port {port} is already used by tunnel #{first}.")]
    DuplicatePort {
        index: usize,
        port: u16,
        first: usize,
    },

    #[error("Tunnel #{index}: invalid {field} '{value}': must be a DNS-1123 label")]
    InvalidResourceName {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("Tunnel #{index}: remote_host must not be empty.")]
    EmptyRemoteHost { index: usize },

    #[error("load.command must name a program.")]
    EmptyLoadCommand,

    #[error("Query #{index}: invalid name '{name}': use letters, digits, '_', '-' or '.'")]
    InvalidQueryName { index: usize, name: String },

    #[error("Query #{index}: name '{name}' is already used by query #{first}.")]
    DuplicateQueryName {
        index: usize,
        name: String,
        first: usize,
    },

    #[error("Query '{name}': query must not be empty.")]
    EmptyQuery { name: String },

    #[error("collect.{field} '{value}' is not a duration like 15s, 5m or 1h.")]
    InvalidDuration { field: &'static str, value: String },

    #[error("collect.service_label must not be empty.")]
    EmptyServiceLabel,
}

// ── Load errors ───────────────────────────────────────────────────────────────

/// Errors raised while running the load generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("No load generator configured. Set load.command or pass one after `--`.")]
    NotConfigured,

    #[error("{program} could not be run: {reason}")]
    Launch { program: String, reason: String },

    #[error("{program} failed ({}): {stderr}", exit_code_display(*code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

// ── Telemetry errors ──────────────────────────────────────────────────────────

/// Errors raised while talking to the trace or metrics server.
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    #[error("Invalid lookback '{0}': use Ns, Nm or Nh (e.g. 30m)")]
    InvalidLookback(String),

    #[error("Invalid step '{0}': use a non-zero Ns, Nm or Nh (e.g. 15s)")]
    InvalidStep(String),

    #[error("No {0} port configured. Set monitoring.{0}_port in the config file.")]
    EndpointNotConfigured(&'static str),

    #[error("{service} returned HTTP {status}: {body}")]
    HttpStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} unreachable at {url}: {reason}")]
    Unreachable {
        service: &'static str,
        url: String,
        reason: String,
    },

    #[error("Unexpected {service} payload: {reason}")]
    Payload {
        service: &'static str,
        reason: String,
    },
}
