//! Runner module - Execution abstraction layer
//!
//! This module provides the process-level building blocks:
//! - `ContainerEngine`: the container runtime seam (one-shot runs, kills,
//!   networks, detached service containers)
//! - `DockerCli`: `ContainerEngine` backed by the `docker` command line
//! - `TrustedRunner`: runs trusted host shell commands (the solve step)
//!
//! The runner module does NOT:
//! - Enforce wall-clock timeouts on container runs (the executor does)
//! - Decide which files are staged
//! - Interpret grading results

pub mod docker;
pub mod engine;
pub mod trusted;

#[cfg(test)]
pub mod testing;

use std::process::Output;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Split a declared command line on whitespace into argv tokens
    pub fn from_command_line(line: &str) -> Self {
        let mut iter = line.split_whitespace().map(str::to_string);
        let program = iter.next().unwrap_or_default();
        Self {
            program,
            args: iter.collect(),
        }
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// Outcome of running a process to completion
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Exit code (-1 if killed by a signal)
    pub exit_code: i32,
    /// Stdout content, lossily decoded
    pub stdout: String,
    /// Stderr content, lossily decoded
    pub stderr: String,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<Output> for RunOutcome {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

// Re-exports
pub use docker::DockerCli;
pub use engine::{ContainerEngine, ContainerRun, DetachedContainer};
pub use trusted::TrustedRunner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line_splits_on_whitespace() {
        let cmd = CommandSpec::from_command_line("  python -m   unittest\tdiscover ");
        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.args, vec!["-m", "unittest", "discover"]);
        assert_eq!(cmd.to_vec().len(), 4);
    }

    #[test]
    fn test_from_command_line_single_token() {
        let cmd = CommandSpec::from_command_line("run.sh");
        assert_eq!(cmd, CommandSpec::new("run.sh"));
    }
}
