//! Cluster forward runner: launches `kubectl port-forward` and verifies it.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use crate::application::ports::{
    BackgroundChild, Clock, CommandRunner, PortProbe, ProgressReporter,
};
use crate::domain::tunnel::cluster_forward_command;
use crate::domain::{ClusterForward, ClusterSettings, TunnelError};

/// Parameters of one cluster-forward launch.
#[derive(Debug, Clone, Copy)]
pub struct ForwardRequest<'a> {
    pub forward: &'a ClusterForward,
    pub local_port: u16,
    pub remote_port: u16,
    /// Total wait, measured from launch, for the port to become bound.
    pub timeout: Duration,
}

/// Timing of the verification loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardTiming {
    /// Wait after spawning before the first check.
    pub settle: Duration,
    /// Delay between subsequent checks.
    pub poll_interval: Duration,
}

impl Default for ForwardTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// A verified, listening cluster forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStarted {
    pub pid: Option<u32>,
}

/// Launches detached cluster forwards and confirms each one is listening.
pub struct ClusterForwardRunner<'a, R, P, C, W> {
    runner: &'a R,
    probe: &'a P,
    clock: &'a C,
    reporter: &'a W,
    settings: &'a ClusterSettings,
    timing: ForwardTiming,
}

impl<'a, R, P, C, W> ClusterForwardRunner<'a, R, P, C, W>
where
    R: CommandRunner,
    P: PortProbe,
    C: Clock,
    W: ProgressReporter,
{
    #[must_use]
    pub fn new(
        runner: &'a R,
        probe: &'a P,
        clock: &'a C,
        reporter: &'a W,
        settings: &'a ClusterSettings,
        timing: ForwardTiming,
    ) -> Self {
        Self {
            runner,
            probe,
            clock,
            reporter,
            settings,
            timing,
        }
    }

    /// Start the forward and block until the local port is bound, the
    /// process exits, or `request.timeout` elapses.
    ///
    /// The spawned process is never killed here: on
    /// [`TunnelError::ForwardNotVerified`] it is left running, since it may
    /// still come up, and the caller is told not to trust the tunnel.
    ///
    /// # Errors
    ///
    /// - [`TunnelError::ForwardLaunch`] if the process cannot be spawned.
    /// - [`TunnelError::ProcessExitedEarly`] if it exits before binding.
    /// - [`TunnelError::ForwardNotVerified`] if the port is still free at
    ///   the deadline.
    /// - [`TunnelError::ProbeUnavailable`] if the port cannot be probed.
    pub async fn run(&self, request: ForwardRequest<'_>) -> Result<ForwardStarted, TunnelError> {
        let port = request.local_port;
        let cmd = cluster_forward_command(
            request.forward,
            request.local_port,
            request.remote_port,
            self.settings,
        );
        self.reporter.step(&format!("executing: {}", cmd.display()));

        let started = self.clock.now();
        let mut child = self
            .runner
            .spawn_background(&cmd.program, &cmd.arg_refs())
            .map_err(|e| TunnelError::ForwardLaunch {
                port,
                reason: format!("{e:#}"),
            })?;
        tracing::debug!(port, pid = ?child.id(), "cluster forward spawned");

        self.clock.sleep(self.timing.settle).await;

        loop {
            let exited = child.try_exit().map_err(|e| TunnelError::ForwardLaunch {
                port,
                reason: format!("{e:#}"),
            })?;
            if let Some(status) = exited {
                let stderr = child.stderr_text().await;
                return Err(TunnelError::ProcessExitedEarly {
                    port,
                    code: status.code(),
                    stderr: stderr.trim().to_string(),
                });
            }

            if !self.probe.is_free(port).await? {
                return Ok(ForwardStarted { pid: child.id() });
            }

            if self.clock.now().duration_since(started) >= request.timeout {
                return Err(TunnelError::ForwardNotVerified {
                    port,
                    timeout: request.timeout,
                });
            }
            self.clock.sleep(self.timing.poll_interval).await;
        }
    }
}
