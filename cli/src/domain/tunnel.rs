//! Tunnel descriptors, derived port state, and process argument vectors.
//!
//! Pure functions only; no I/O, no async, no process spawning. Commands are
//! built as discrete argument tokens so nothing is ever passed through a shell.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Tunnel descriptors ───────────────────────────────────────────────────────

/// One desired local-to-remote binding.
///
/// `local_port` is the only externally observable handle for liveness: the
/// tunnel is up iff something listens on it, whichever process that is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSpec {
    /// Local port bound by the relay hop and, when present, the cluster hop.
    pub local_port: u16,
    /// Host reachable from the relay, e.g. `localhost`.
    pub remote_host: String,
    /// Port on `remote_host`.
    pub remote_port: u16,
    /// Port the relay's SSH daemon listens on.
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    /// Optional second-hop forward into the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_forward: Option<ClusterForward>,
}

/// Second-hop `kubectl port-forward` target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterForward {
    pub resource_name: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl ClusterForward {
    /// `<type>/<name>` as accepted by `kubectl port-forward`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.resource_type, self.resource_name)
    }
}

/// Relay connection identity shared by every tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayIdentity {
    pub user: String,
    pub host: String,
    /// Private key passed to `ssh -i`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    /// Additional `ssh` arguments inserted before the destination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl RelayIdentity {
    /// `user@host` destination string.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// How the cluster forward is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// `kubectl` executable name or path.
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    /// Prefix the forward with `sudo`.
    #[serde(default)]
    pub sudo: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            sudo: false,
        }
    }
}

fn default_relay_port() -> u16 {
    22
}

fn default_resource_type() -> String {
    "service".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

// ── Port state ───────────────────────────────────────────────────────────────

/// Result of a single port probe. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PortState {
    Free,
    Occupied { pids: BTreeSet<u32> },
}

impl PortState {
    #[must_use]
    pub fn from_pids(pids: BTreeSet<u32>) -> Self {
        if pids.is_empty() {
            Self::Free
        } else {
            Self::Occupied { pids }
        }
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Parse `lsof -t` output (one PID per line) into a PID set.
///
/// Blank and non-numeric lines are ignored; lsof may repeat a PID once per
/// matching socket.
#[must_use]
pub fn parse_lsof_pids(stdout: &str) -> BTreeSet<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Interpret a finished `lsof -w -t` run.
///
/// lsof exits 1 with no output when nothing matches, which is the only
/// non-zero exit read as "free". Any other failure, or a non-zero exit that
/// printed to stderr, means the socket table could not be read.
///
/// # Errors
///
/// Returns a description of the failure for anything other than a clean
/// match or a clean miss.
pub fn interpret_lsof(
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<BTreeSet<u32>, String> {
    let stderr = stderr.trim();
    let pids = parse_lsof_pids(stdout);
    match code {
        Some(0) => Ok(pids),
        _ if !stderr.is_empty() => Err(stderr.to_string()),
        Some(1) if !pids.is_empty() => Ok(pids),
        Some(1) if stdout.trim().is_empty() => Ok(BTreeSet::new()),
        Some(1) => Err(format!("unexpected lsof output: {}", stdout.trim())),
        Some(code) => Err(format!("lsof exited with code {code}")),
        None => Err("lsof terminated by signal".to_string()),
    }
}

// ── Argument vectors ─────────────────────────────────────────────────────────

/// A program plus its discrete arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Arguments as borrowed slices, the shape `CommandRunner` takes.
    #[must_use]
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    /// Space-joined rendering for status lines. Not shell-safe.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Port-probe command: `lsof -w -t -i tcp:<port>`, warnings suppressed.
#[must_use]
pub fn probe_command(port: u16) -> CommandLine {
    CommandLine {
        program: "lsof".to_string(),
        args: vec![
            "-w".into(),
            "-t".into(),
            "-i".into(),
            format!("tcp:{port}"),
        ],
    }
}

/// Relay-hop command: a backgrounded SSH local forward.
///
/// `-f -N` makes ssh fork after authentication without running a remote
/// command, and `ExitOnForwardFailure` turns a failed bind into a non-zero
/// exit of the launch command.
#[must_use]
pub fn relay_command(spec: &TunnelSpec, relay: &RelayIdentity) -> CommandLine {
    let mut args = vec![
        "-p".to_string(),
        spec.relay_port.to_string(),
        "-f".into(),
        "-N".into(),
        "-o".into(),
        "ExitOnForwardFailure=yes".into(),
        "-L".into(),
        format!(
            "{}:{}:{}",
            spec.local_port, spec.remote_host, spec.remote_port
        ),
    ];
    if let Some(key) = &relay.identity_file {
        args.push("-i".into());
        args.push(key.display().to_string());
    }
    args.extend(relay.extra_args.iter().cloned());
    args.push(relay.destination());
    CommandLine {
        program: "ssh".to_string(),
        args,
    }
}

/// Cluster-hop command: `[sudo] kubectl port-forward <type>/<name> <local>:<remote> -n <ns>`.
#[must_use]
pub fn cluster_forward_command(
    forward: &ClusterForward,
    local_port: u16,
    remote_port: u16,
    settings: &ClusterSettings,
) -> CommandLine {
    let mut tokens = vec![
        settings.kubectl.clone(),
        "port-forward".into(),
        forward.target(),
        format!("{local_port}:{remote_port}"),
        "-n".into(),
        forward.namespace.clone(),
    ];
    if settings.sudo {
        tokens.insert(0, "sudo".into());
    }
    let program = tokens.remove(0);
    CommandLine {
        program,
        args: tokens,
    }
}
