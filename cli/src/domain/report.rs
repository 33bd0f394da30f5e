//! Per-tunnel outcomes of an `establish` batch.

use serde::Serialize;

use crate::domain::error::TunnelError;

/// Why a tunnel was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The local port could not be freed, or was re-occupied before the relay hop.
    PortBusy,
    /// The local port was occupied right before the cluster hop.
    BusyForClusterForward,
}

/// Why the cluster hop failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardFailure {
    LaunchFailed { message: String },
    ProcessExitedEarly { code: Option<i32>, stderr: String },
    ForwardNotVerified { timeout_secs: u64 },
}

/// Why a tunnel attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailReason {
    RelayError { message: String },
    ClusterForwardError { cause: ForwardFailure },
}

impl FailReason {
    /// Map a per-tunnel error onto the stage that produced it.
    ///
    /// Returns `None` for errors that never become an outcome (batch-fatal
    /// probe failures and cleanup failures, which surface as skips).
    #[must_use]
    pub fn from_error(err: &TunnelError) -> Option<Self> {
        match err {
            TunnelError::RelayLaunch { reason, .. } => Some(Self::RelayError {
                message: reason.clone(),
            }),
            TunnelError::ForwardLaunch { reason, .. } => Some(Self::ClusterForwardError {
                cause: ForwardFailure::LaunchFailed {
                    message: reason.clone(),
                },
            }),
            TunnelError::ProcessExitedEarly { code, stderr, .. } => {
                Some(Self::ClusterForwardError {
                    cause: ForwardFailure::ProcessExitedEarly {
                        code: *code,
                        stderr: stderr.clone(),
                    },
                })
            }
            TunnelError::ForwardNotVerified { timeout, .. } => Some(Self::ClusterForwardError {
                cause: ForwardFailure::ForwardNotVerified {
                    timeout_secs: timeout.as_secs(),
                },
            }),
            TunnelError::ProbeUnavailable { .. } | TunnelError::PortStillOccupied { .. } => None,
        }
    }
}

/// Terminal state of one tunnel within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TunnelOutcome {
    Established,
    Skipped { reason: SkipReason },
    Failed { reason: FailReason },
}

impl TunnelOutcome {
    #[must_use]
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Established)
    }

    /// Short label used in terminal output, e.g. `skipped: port busy`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Established => "established".to_string(),
            Self::Skipped {
                reason: SkipReason::PortBusy,
            } => "skipped: port busy".to_string(),
            Self::Skipped {
                reason: SkipReason::BusyForClusterForward,
            } => "skipped: busy for cluster forward".to_string(),
            Self::Failed {
                reason: FailReason::RelayError { message },
            } => format!("failed: relay error ({message})"),
            Self::Failed {
                reason: FailReason::ClusterForwardError { cause },
            } => match cause {
                ForwardFailure::LaunchFailed { message } => {
                    format!("failed: cluster forward could not launch ({message})")
                }
                ForwardFailure::ProcessExitedEarly { code, .. } => match code {
                    Some(c) => format!("failed: cluster forward exited early (exit code {c})"),
                    None => "failed: cluster forward exited early (signal)".to_string(),
                },
                ForwardFailure::ForwardNotVerified { timeout_secs } => {
                    format!("failed: cluster forward not listening after {timeout_secs}s")
                }
            },
        }
    }
}

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelReportEntry {
    pub local_port: u16,
    #[serde(flatten)]
    pub outcome: TunnelOutcome,
}

/// Outcomes in the order the specs were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TunnelReport {
    pub tunnels: Vec<TunnelReportEntry>,
}

impl TunnelReport {
    pub fn record(&mut self, local_port: u16, outcome: TunnelOutcome) {
        self.tunnels.push(TunnelReportEntry {
            local_port,
            outcome,
        });
    }

    #[must_use]
    pub fn get(&self, local_port: u16) -> Option<&TunnelOutcome> {
        self.tunnels
            .iter()
            .find(|e| e.local_port == local_port)
            .map(|e| &e.outcome)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }

    /// True when every tunnel reached `Established`. An empty report is
    /// trivially successful.
    #[must_use]
    pub fn all_established(&self) -> bool {
        self.tunnels.iter().all(|e| e.outcome.is_established())
    }

    /// Process exit code for the CLI: 0 iff all tunnels are up.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_established())
    }
}
