//! Trusted runner implementation
//!
//! Executes trusted host shell commands (the caller-supplied solve command)
//! directly, without a container.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::RunOutcome;

/// Runner that executes trusted shell commands directly
#[derive(Debug, Clone)]
pub struct TrustedRunner {
    shell: String,
}

impl TrustedRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Run `<shell> -c <command>` inside `work_dir`.
    ///
    /// The child and its whole process group are killed if the timeout expires.
    pub async fn execute(
        &self,
        command: &str,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<RunOutcome> {
        debug!("Running trusted command {:?} in {:?}", command, work_dir);

        // own process group, so a timeout also reaches what the command spawned
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn trusted command")?;
        let pid = child.id();

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.context("Failed to wait for trusted command")?,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                anyhow::bail!("timed out after {}s", timeout.as_secs_f64());
            }
        };

        Ok(RunOutcome::from(output))
    }
}

fn kill_group(pgid: u32) {
    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

impl Default for TrustedRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}
