//! Domain types and validators for meshbench configuration.
//!
//! Pure functions only; no I/O, no async, no filesystem access.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::load::LoadConfig;
use crate::domain::metrics::{CollectConfig, is_valid_query_name};
use crate::domain::telemetry::{parse_lookback, parse_step};
use crate::domain::tunnel::{ClusterSettings, RelayIdentity, TunnelSpec};

/// Kubernetes resource names and namespaces (RFC 1123 label).
static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex")
});

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.meshbench/tunnels.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshbenchConfig {
    /// Relay (SSH) identity shared by every tunnel.
    pub relay: RelayIdentity,
    /// Cluster forward launch settings.
    #[serde(default)]
    pub cluster: ClusterSettings,
    /// Step timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Tunnels, established in this order.
    #[serde(default)]
    pub tunnels: Vec<TunnelSpec>,
    /// Local endpoints of the monitoring stack once tunnels are up.
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Load generator run by `meshbench load`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadConfig>,
    /// Range queries run by `meshbench collect`.
    #[serde(default)]
    pub collect: CollectConfig,
}

/// Bounded waits used by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait for a reaped port to be released.
    pub reap_secs: u64,
    /// Wait for the relay launch command to return.
    pub relay_launch_secs: u64,
    /// Wait after spawning a cluster forward before the first check.
    pub settle_secs: u64,
    /// Total wait for a cluster forward to start listening.
    pub forward_verify_secs: u64,
    /// Interval between port re-probes.
    pub poll_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            reap_secs: 10,
            relay_launch_secs: 30,
            settle_secs: 2,
            forward_verify_secs: 10,
            poll_millis: 1000,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn reap(&self) -> Duration {
        Duration::from_secs(self.reap_secs)
    }

    #[must_use]
    pub fn relay_launch(&self) -> Duration {
        Duration::from_secs(self.relay_launch_secs)
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    #[must_use]
    pub fn forward_verify(&self) -> Duration {
        Duration::from_secs(self.forward_verify_secs)
    }

    #[must_use]
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_millis.max(1))
    }
}

/// Where the trace and metrics servers are reachable locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_monitoring_host")]
    pub host: String,
    /// Local port forwarded to the trace server's query API.
    #[serde(default)]
    pub trace_port: Option<u16>,
    /// Local port forwarded to the metrics server.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            host: default_monitoring_host(),
            trace_port: None,
            metrics_port: None,
        }
    }
}

impl MonitoringConfig {
    #[must_use]
    pub fn trace_url(&self) -> Option<String> {
        self.trace_port.map(|p| format!("http://{}:{p}", self.host))
    }

    #[must_use]
    pub fn metrics_url(&self) -> Option<String> {
        self.metrics_port.map(|p| format!("http://{}:{p}", self.host))
    }
}

fn default_monitoring_host() -> String {
    "127.0.0.1".to_string()
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a loaded configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found: empty relay identity, a zero or
/// duplicated local port, an empty remote host, a cluster resource name or
/// namespace that is not a DNS-1123 label, an empty load command, or a
/// malformed `collect` section.
pub fn validate_config(config: &MeshbenchConfig) -> Result<()> {
    if config.relay.user.trim().is_empty() {
        return Err(ConfigError::EmptyRelayField { field: "user" }.into());
    }
    if config.relay.host.trim().is_empty() {
        return Err(ConfigError::EmptyRelayField { field: "host" }.into());
    }

    let mut seen: HashMap<u16, usize> = HashMap::new();
    for (index, spec) in config.tunnels.iter().enumerate() {
        if spec.local_port == 0 {
            return Err(ConfigError::ZeroPort { index }.into());
        }
        if let Some(&first) = seen.get(&spec.local_port) {
            return Err(ConfigError::DuplicatePort {
                index,
                port: spec.local_port,
                first,
            }
            .into());
        }
        seen.insert(spec.local_port, index);

        if spec.remote_host.trim().is_empty() {
            return Err(ConfigError::EmptyRemoteHost { index }.into());
        }
        if let Some(fwd) = &spec.cluster_forward {
            validate_label(index, "resource_name", &fwd.resource_name)?;
            validate_label(index, "namespace", &fwd.namespace)?;
        }
    }

    if let Some(load) = &config.load {
        if load.command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyLoadCommand.into());
        }
    }
    validate_collect(&config.collect)
}

fn validate_collect(collect: &CollectConfig) -> Result<()> {
    if parse_step(&collect.step).is_err() {
        return Err(ConfigError::InvalidDuration {
            field: "step",
            value: collect.step.clone(),
        }
        .into());
    }
    if parse_lookback(&collect.lookback).is_err() {
        return Err(ConfigError::InvalidDuration {
            field: "lookback",
            value: collect.lookback.clone(),
        }
        .into());
    }
    if collect.service_label.trim().is_empty() {
        return Err(ConfigError::EmptyServiceLabel.into());
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (index, q) in collect.queries.iter().enumerate() {
        if !is_valid_query_name(&q.name) {
            return Err(ConfigError::InvalidQueryName {
                index,
                name: q.name.clone(),
            }
            .into());
        }
        if let Some(&first) = seen.get(q.name.as_str()) {
            return Err(ConfigError::DuplicateQueryName {
                index,
                name: q.name.clone(),
                first,
            }
            .into());
        }
        seen.insert(&q.name, index);
        if q.query.trim().is_empty() {
            return Err(ConfigError::EmptyQuery {
                name: q.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_label(index: usize, field: &'static str, value: &str) -> Result<()> {
    if !DNS_LABEL.is_match(value) {
        return Err(ConfigError::InvalidResourceName {
            index,
            field,
            value: value.to_string(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
