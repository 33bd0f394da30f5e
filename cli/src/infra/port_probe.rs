//! `lsof`-backed implementation of the `PortProbe` port.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::application::ports::{CommandRunner, PortProbe};
use crate::domain::TunnelError;
use crate::domain::tunnel::{interpret_lsof, probe_command};

/// Probes TCP ports by running `lsof -w -t -i tcp:<port>`.
///
/// Only a clean exit 1 with no output counts as "free"; a run that fails
/// with diagnostics is reported as [`TunnelError::ProbeUnavailable`].
pub struct LsofPortProbe<'a, R> {
    runner: &'a R,
    timeout: Duration,
}

impl<'a, R: CommandRunner> LsofPortProbe<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl<R: CommandRunner> PortProbe for LsofPortProbe<'_, R> {
    async fn owning_pids(&self, port: u16) -> Result<BTreeSet<u32>, TunnelError> {
        let cmd = probe_command(port);
        let output = self
            .runner
            .run_with_timeout(&cmd.program, &cmd.arg_refs(), self.timeout)
            .await
            .map_err(|e| TunnelError::ProbeUnavailable {
                reason: format!("{e:#}"),
            })?;
        let pids = interpret_lsof(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
        .map_err(|reason| TunnelError::ProbeUnavailable { reason })?;
        tracing::debug!(port, ?pids, "probed port");
        Ok(pids)
    }
}
