//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with guaranteed timeout and kill.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

use crate::application::ports::{BackgroundChild, CommandRunner};

/// Default timeout for short-lived commands such as `lsof`.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(10);

/// Production `CommandRunner`; uses tokio for async process execution
/// with guaranteed timeout and kill.
///
/// Background and daemonizing processes write stderr to a log file under
/// `log_dir` rather than a pipe: a pipe would close when this process exits
/// and take the forward down with a `SIGPIPE`.
pub struct TokioCommandRunner {
    timeout: Duration,
    log_dir: PathBuf,
    seq: AtomicU32,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            log_dir: std::env::temp_dir().join("meshbench"),
            seq: AtomicU32::new(0),
        }
    }

    /// Write background-process logs to `dir` instead of the temp directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    /// Default timeout used by callers that do not pick their own.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn log_file(&self, program: &str) -> Result<(PathBuf, std::fs::File)> {
        std::fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("cannot create {}", self.log_dir.display()))?;
        let stem: String = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let name = format!(
            "{stem}-{}-{}-{}.log",
            std::process::id(),
            chrono::Utc::now().timestamp_millis(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        );
        let path = self.log_dir.join(name);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        Ok((path, file))
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

impl CommandRunner for TokioCommandRunner {
    type Child = TokioBackgroundChild;

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::debug!(program, ?args, "running");
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Read stdout/stderr concurrently with wait() so a child filling the
        // pipe buffer cannot deadlock us.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }

    async fn run_detached(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let (log_path, log) = self.log_file(program)?;
        tracing::debug!(program, ?args, log = %log_path.display(), "launching detached");

        // stdin stays inherited so an interactive passphrase prompt still works.
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let status = tokio::select! {
            status = child.wait() => status.with_context(|| format!("waiting for {program}"))?,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        };

        let stderr = if status.success() {
            Vec::new()
        } else {
            tokio::fs::read(&log_path).await.unwrap_or_default()
        };
        Ok(Output {
            status,
            stdout: Vec::new(),
            stderr,
        })
    }

    fn spawn_background(&self, program: &str, args: &[&str]) -> Result<TokioBackgroundChild> {
        let (log_path, log) = self.log_file(program)?;
        tracing::debug!(program, ?args, log = %log_path.display(), "spawning background");

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        Ok(TokioBackgroundChild { child, log_path })
    }
}

/// A detached child whose stderr goes to `log_path`.
///
/// Dropping the handle leaves the process running.
pub struct TokioBackgroundChild {
    child: tokio::process::Child,
    log_path: PathBuf,
}

impl TokioBackgroundChild {
    /// Where the process's stderr is written.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl BackgroundChild for TokioBackgroundChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .context("checking background process status")
    }

    async fn stderr_text(&mut self) -> String {
        tokio::fs::read(&self.log_path)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}
