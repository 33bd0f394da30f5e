//! SIGKILL delivery via `nix`.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::application::ports::Signaller;

/// Sends `SIGKILL`. A process that is already gone counts as killed.
pub struct NixSignaller;

impl Signaller for NixSignaller {
    fn kill(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).with_context(|| format!("pid {pid} out of range"))?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("sending SIGKILL to {pid}")),
        }
    }
}
