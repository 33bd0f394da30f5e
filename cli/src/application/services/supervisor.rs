//! Tunnel supervisor: two-phase establishment of relay and cluster forwards.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//!
//! The supervisor keeps no memory between calls: every decision re-probes the
//! OS socket table, which is the sole authority on whether a tunnel is up.
//! Ports are arbitrated purely by probing, so only one supervisor may run
//! against a given port set at a time.

use std::collections::HashSet;

use serde::Serialize;

use crate::application::ports::{Clock, CommandRunner, PortProbe, ProgressReporter, Signaller};
use crate::application::services::cluster_forward::{
    ClusterForwardRunner, ForwardRequest, ForwardTiming,
};
use crate::application::services::reaper::{self, ReapOptions, ReapOutcome};
use crate::domain::tunnel::relay_command;
use crate::domain::{
    ClusterSettings, FailReason, MeshbenchConfig, RelayIdentity, SkipReason, TimeoutConfig,
    TunnelError, TunnelOutcome, TunnelReport, TunnelSpec,
};

/// Static settings shared by every tunnel in a batch.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub relay: RelayIdentity,
    pub cluster: ClusterSettings,
    pub timeouts: TimeoutConfig,
}

impl From<&MeshbenchConfig> for SupervisorConfig {
    fn from(config: &MeshbenchConfig) -> Self {
        Self {
            relay: config.relay.clone(),
            cluster: config.cluster.clone(),
            timeouts: config.timeouts,
        }
    }
}

/// Result of reaping one port during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TeardownResult {
    NotInUse,
    Freed { pids: Vec<u32> },
    StillOccupied { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownEntry {
    pub local_port: u16,
    #[serde(flatten)]
    pub result: TeardownResult,
}

/// Orchestrates reaping, relay forwards and cluster forwards for a set of
/// tunnels.
pub struct TunnelSupervisor<'a, R, P, S, C, W> {
    runner: &'a R,
    probe: &'a P,
    signaller: &'a S,
    clock: &'a C,
    reporter: &'a W,
    config: SupervisorConfig,
}

impl<'a, R, P, S, C, W> TunnelSupervisor<'a, R, P, S, C, W>
where
    R: CommandRunner,
    P: PortProbe,
    S: Signaller,
    C: Clock,
    W: ProgressReporter,
{
    #[must_use]
    pub fn new(
        runner: &'a R,
        probe: &'a P,
        signaller: &'a S,
        clock: &'a C,
        reporter: &'a W,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            runner,
            probe,
            signaller,
            clock,
            reporter,
            config,
        }
    }

    /// Establish every tunnel in `specs`, in order.
    ///
    /// Phase 1 reaps the local port of every tunnel before phase 2 binds any of
    /// them. Per-tunnel failures are recorded in the report and never undo
    /// tunnels that were already established.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::ProbeUnavailable`] if the socket table cannot be
    /// read at any point; no report is produced in that case.
    pub async fn establish(&self, specs: &[TunnelSpec]) -> Result<TunnelReport, TunnelError> {
        let blocked = self.cleanup(specs).await?;

        let mut report = TunnelReport::default();
        for spec in specs {
            let cleanup_failed = blocked.contains(&spec.local_port);
            let outcome = self.establish_one(spec, cleanup_failed).await?;
            tracing::debug!(port = spec.local_port, outcome = %outcome.label(), "tunnel settled");
            report.record(spec.local_port, outcome);
        }
        Ok(report)
    }

    /// Reap the local port of every tunnel, reporting each result.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::ProbeUnavailable`] if the socket table cannot be
    /// read.
    pub async fn teardown(&self, specs: &[TunnelSpec]) -> Result<Vec<TeardownEntry>, TunnelError> {
        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = match self.reap(spec.local_port).await {
                Ok(ReapOutcome::Noop) => TeardownResult::NotInUse,
                Ok(ReapOutcome::Freed { pids }) => TeardownResult::Freed { pids },
                Err(e) if e.is_batch_fatal() => return Err(e),
                Err(e) => {
                    self.reporter.warn(&e.to_string());
                    TeardownResult::StillOccupied {
                        message: e.to_string(),
                    }
                }
            };
            entries.push(TeardownEntry {
                local_port: spec.local_port,
                result,
            });
        }
        Ok(entries)
    }

    /// Phase 1: returns the ports whose cleanup failed.
    async fn cleanup(&self, specs: &[TunnelSpec]) -> Result<HashSet<u16>, TunnelError> {
        let mut blocked = HashSet::new();
        for spec in specs {
            match self.reap(spec.local_port).await {
                Ok(_) => {}
                Err(e) if e.is_batch_fatal() => return Err(e),
                Err(e) => {
                    self.reporter.warn(&e.to_string());
                    blocked.insert(spec.local_port);
                }
            }
        }
        Ok(blocked)
    }

    async fn reap(&self, port: u16) -> Result<ReapOutcome, TunnelError> {
        let opts = ReapOptions {
            timeout: self.config.timeouts.reap(),
            poll_interval: self.config.timeouts.poll(),
        };
        reaper::free_port(
            self.probe,
            self.signaller,
            self.clock,
            self.reporter,
            port,
            opts,
        )
        .await
    }

    /// Phase 2 for a single spec. Only batch-fatal errors escape.
    async fn establish_one(
        &self,
        spec: &TunnelSpec,
        cleanup_failed: bool,
    ) -> Result<TunnelOutcome, TunnelError> {
        let port = spec.local_port;

        if cleanup_failed || !self.probe.is_free(port).await? {
            self.reporter.warn(&format!(
                "port {port} is still in use, skipping relay tunnel setup"
            ));
            return Ok(TunnelOutcome::Skipped {
                reason: SkipReason::PortBusy,
            });
        }

        if let Err(e) = self.launch_relay(spec).await {
            self.reporter.warn(&e.to_string());
            return Ok(failure_outcome(&e));
        }

        let Some(forward) = &spec.cluster_forward else {
            return Ok(TunnelOutcome::Established);
        };

        if !self.probe.is_free(port).await? {
            self.reporter.warn(&format!(
                "port {port} is still in use, skipping cluster port-forward"
            ));
            return Ok(TunnelOutcome::Skipped {
                reason: SkipReason::BusyForClusterForward,
            });
        }

        self.reporter.step(&format!(
            "setting up cluster port-forward: {port} -> {}:{} in namespace '{}'",
            forward.resource_name, spec.remote_port, forward.namespace
        ));
        let runner = ClusterForwardRunner::new(
            self.runner,
            self.probe,
            self.clock,
            self.reporter,
            &self.config.cluster,
            ForwardTiming {
                settle: self.config.timeouts.settle(),
                poll_interval: self.config.timeouts.poll(),
            },
        );
        let request = ForwardRequest {
            forward,
            local_port: port,
            remote_port: spec.remote_port,
            timeout: self.config.timeouts.forward_verify(),
        };
        match runner.run(request).await {
            Ok(started) => {
                let pid = started
                    .pid
                    .map_or_else(|| "unknown".to_string(), |p| p.to_string());
                self.reporter
                    .success(&format!("cluster forward active on port {port} (pid {pid})"));
                Ok(TunnelOutcome::Established)
            }
            Err(e) if e.is_batch_fatal() => Err(e),
            Err(e) => {
                self.reporter.warn(&e.to_string());
                Ok(failure_outcome(&e))
            }
        }
    }

    /// Launch the relay hop. Success means the launch command exited 0;
    /// the backgrounded session itself is not re-verified.
    async fn launch_relay(&self, spec: &TunnelSpec) -> Result<(), TunnelError> {
        let port = spec.local_port;
        let cmd = relay_command(spec, &self.config.relay);
        self.reporter.step(&format!(
            "opening relay tunnel: {port} -> {}:{} via {}",
            spec.remote_host,
            spec.remote_port,
            self.config.relay.destination()
        ));

        let output = self
            .runner
            .run_detached(
                &cmd.program,
                &cmd.arg_refs(),
                self.config.timeouts.relay_launch(),
            )
            .await
            .map_err(|e| TunnelError::RelayLaunch {
                port,
                reason: format!("{e:#}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                match output.status.code() {
                    Some(code) => format!("{} exited with code {code}", cmd.program),
                    None => format!("{} terminated by signal", cmd.program),
                }
            } else {
                stderr
            };
            return Err(TunnelError::RelayLaunch { port, reason });
        }

        self.reporter
            .success(&format!("relay tunnel opened on port {port}"));
        Ok(())
    }
}

fn failure_outcome(err: &TunnelError) -> TunnelOutcome {
    FailReason::from_error(err).map_or(
        TunnelOutcome::Skipped {
            reason: SkipReason::PortBusy,
        },
        |reason| TunnelOutcome::Failed { reason },
    )
}
