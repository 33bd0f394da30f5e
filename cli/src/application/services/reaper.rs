//! Process reaper: forcibly frees a TCP port.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Termination is always SIGKILL: the goal is a clean slate for the next
//! bind, not a graceful shutdown of the occupant.

use std::time::Duration;

use crate::application::ports::{Clock, PortProbe, ProgressReporter, Signaller};
use crate::domain::TunnelError;

/// Bounds for a kill-then-recheck cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay between re-probes.
    pub poll_interval: Duration,
}

impl ReapOptions {
    /// Fixed 1 s poll with the given timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Successful result of [`free_port`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Nothing owned the port; no signal was sent and no wait happened.
    Noop,
    /// The listed processes were killed and the port is now free.
    Freed { pids: Vec<u32> },
}

/// Kill every process holding `port` and wait for the port to be released.
///
/// # Errors
///
/// - [`TunnelError::ProbeUnavailable`] if the socket table cannot be read.
/// - [`TunnelError::PortStillOccupied`] if the port is still held once
///   `opts.timeout` has elapsed. Never returned earlier than that.
pub async fn free_port(
    probe: &impl PortProbe,
    signaller: &impl Signaller,
    clock: &impl Clock,
    reporter: &impl ProgressReporter,
    port: u16,
    opts: ReapOptions,
) -> Result<ReapOutcome, TunnelError> {
    let owners = probe.owning_pids(port).await?;
    if owners.is_empty() {
        reporter.step(&format!("port {port} is not in use"));
        return Ok(ReapOutcome::Noop);
    }

    let own_pid = std::process::id();
    let targets: Vec<u32> = owners.into_iter().filter(|&pid| pid != own_pid).collect();
    for &pid in &targets {
        reporter.step(&format!("killing process {pid} using port {port}..."));
        if let Err(e) = signaller.kill(pid) {
            reporter.warn(&format!("could not kill process {pid}: {e:#}"));
        }
    }

    let started = clock.now();
    loop {
        if probe.is_free(port).await? {
            reporter.success(&format!("port {port} is now free"));
            return Ok(ReapOutcome::Freed { pids: targets });
        }
        if clock.now().duration_since(started) >= opts.timeout {
            return Err(TunnelError::PortStillOccupied {
                port,
                timeout: opts.timeout,
            });
        }
        tracing::debug!(port, "port still occupied, re-probing");
        clock.sleep(opts.poll_interval).await;
    }
}
