//! Sandbox executor
//!
//! Runs one evaluator command inside a fresh, network-isolated container
//! against a staged workspace:
//! 1. optional solve step on the host (short fixed timeout)
//! 2. container run under a wall-clock timeout; the container's name is
//!    chosen before it starts so the timeout path can always kill it
//! 3. exit code check and, for grade commands, artifact read-back
//! 4. workspace removal, on every path

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::core::{CommandKind, ValidationError};
use crate::grading::{read_artifact, GradeOutcome};
use crate::runner::{CommandSpec, ContainerEngine, ContainerRun, TrustedRunner};
use crate::workspace::Workspace;

/// One command execution request
#[derive(Debug, Clone)]
pub struct ExecutionRequest<'a> {
    pub kind: CommandKind,
    pub image: &'a str,
    pub command: &'a str,
    pub timeout: Duration,
    pub expected_exit_code: Option<i32>,
    /// Host shell command run in the workspace before the container
    pub solve_command: Option<&'a str>,
}

impl<'a> ExecutionRequest<'a> {
    pub fn new(kind: CommandKind, image: &'a str, command: &'a str, timeout: Duration) -> Self {
        Self {
            kind,
            image,
            command,
            timeout,
            expected_exit_code: None,
            solve_command: None,
        }
    }

    pub fn expect_exit_code(mut self, code: Option<i32>) -> Self {
        self.expected_exit_code = code;
        self
    }

    pub fn with_solve(mut self, solve_command: Option<&'a str>) -> Self {
        self.solve_command = solve_command;
        self
    }
}

/// Everything observed while executing one command
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub kind: CommandKind,
    /// None if the container never reported one (timeout, runtime failure)
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Grading artifact, for grade commands that produced one
    pub grade: Option<GradeOutcome>,
    pub errors: Vec<ValidationError>,
}

impl ExecutionOutcome {
    fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            grade: None,
            errors: Vec::new(),
        }
    }
}

/// Executes evaluator commands in containers
pub struct SandboxExecutor {
    engine: Arc<dyn ContainerEngine>,
    trusted: TrustedRunner,
    config: ExecutorConfig,
}

impl SandboxExecutor {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ExecutorConfig) -> Self {
        Self {
            engine,
            trusted: TrustedRunner::default(),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `request` in `workspace`, consuming (and removing) it
    pub async fn execute(
        &self,
        task: &Path,
        workspace: Workspace,
        request: &ExecutionRequest<'_>,
    ) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::new(request.kind);

        if let Some(solve) = request.solve_command {
            if let Err(reason) = self.solve(solve, workspace.path()).await {
                outcome.errors.push(ValidationError::SolveFailed {
                    task: task.to_path_buf(),
                    command: request.kind,
                    reason,
                });
                workspace.close();
                return outcome;
            }
        }

        let run = ContainerRun {
            name: container_name(request.kind),
            image: request.image.to_string(),
            command: CommandSpec::from_command_line(request.command),
            workspace: workspace.path().to_path_buf(),
            workdir: self.config.container_workdir.clone(),
            user: self.config.user.clone(),
            network_disabled: true,
        };

        info!(
            "Executing {} `{}` for {:?} in {} (container {})",
            request.kind, request.command, task, request.image, run.name
        );

        let mut timed_out = false;
        match tokio::time::timeout(request.timeout, self.engine.run(&run)).await {
            Ok(Ok(result)) => {
                debug!("[{}] exit code: {}", request.kind, result.exit_code);
                if !result.stdout.is_empty() {
                    debug!("[{}] stdout:\n{}", request.kind, result.stdout);
                }
                if !result.stderr.is_empty() {
                    debug!("[{}] stderr:\n{}", request.kind, result.stderr);
                }

                if let Some(expected) = request.expected_exit_code {
                    if expected != result.exit_code {
                        outcome.errors.push(ValidationError::UnexpectedReturnCode {
                            task: task.to_path_buf(),
                            command: request.kind,
                            expected,
                            observed: result.exit_code,
                        });
                    }
                }

                outcome.exit_code = Some(result.exit_code);
                outcome.stdout = result.stdout;
                outcome.stderr = result.stderr;
            }
            Ok(Err(e)) => {
                outcome.errors.push(ValidationError::ContainerRuntime {
                    task: task.to_path_buf(),
                    command: request.kind,
                    reason: format!("{:#}", e),
                });
            }
            Err(_) => {
                timed_out = true;
                warn!(
                    "{} for {:?} exceeded {}s, killing container {}",
                    request.kind,
                    task,
                    request.timeout.as_secs_f64(),
                    run.name
                );
                match tokio::time::timeout(self.config.kill_timeout, self.engine.kill(&run.name))
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Failed to kill container {}: {:#}", run.name, e),
                    Err(_) => error!(
                        "Kill of container {} unanswered after {}s",
                        run.name,
                        self.config.kill_timeout.as_secs_f64()
                    ),
                }
                outcome.errors.push(ValidationError::TimeoutKill {
                    task: task.to_path_buf(),
                    command: request.kind,
                    timeout: request.timeout,
                });
            }
        }

        if request.kind == CommandKind::Grade && !timed_out {
            match read_artifact(workspace.path()).await {
                Ok(grade) => outcome.grade = grade,
                Err(e) => warn!("Ignoring grading artifact for {:?}: {:#}", task, e),
            }
        }

        workspace.close();
        outcome
    }

    async fn solve(&self, command: &str, work_dir: &Path) -> Result<(), String> {
        debug!("Solving with `{}`", command);
        match self
            .trusted
            .execute(command, work_dir, self.config.solve_timeout)
            .await
        {
            Ok(result) if result.is_success() => Ok(()),
            Ok(result) => Err(format!(
                "`{}` exited with {}: {}",
                command,
                result.exit_code,
                result.stderr.trim()
            )),
            Err(e) => Err(format!("`{}`: {:#}", command, e)),
        }
    }
}

/// Unique container handle, known before the container exists
fn container_name(kind: CommandKind) -> String {
    let kind = match kind {
        CommandKind::Run => "run",
        CommandKind::Test => "test",
        CommandKind::Grade => "grade",
    };
    format!("access-{}-{}", kind, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::FakeEngine;

    fn executor(engine: FakeEngine) -> (Arc<FakeEngine>, SandboxExecutor) {
        let engine = Arc::new(engine);
        let executor = SandboxExecutor::new(engine.clone(), ExecutorConfig::default());
        (engine, executor)
    }

    #[tokio::test]
    async fn test_unexpected_return_code() {
        let (_, executor) = executor(FakeEngine {
            exit_code: 1,
            ..Default::default()
        });
        let request = ExecutionRequest::new(CommandKind::Run, "img", "run.sh", Duration::from_secs(5))
            .expect_exit_code(Some(0));

        let outcome = executor
            .execute(Path::new("task"), Workspace::new().unwrap(), &request)
            .await;

        assert_eq!(outcome.exit_code, Some(1));
        assert_eq!(outcome.errors.len(), 1);
        match &outcome.errors[0] {
            ValidationError::UnexpectedReturnCode {
                expected, observed, ..
            } => {
                assert_eq!(*expected, 0);
                assert_eq!(*observed, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_matching_return_code_is_clean() {
        let (_, executor) = executor(FakeEngine {
            stdout: "hello\n".to_string(),
            ..Default::default()
        });
        let request = ExecutionRequest::new(CommandKind::Run, "img", "run.sh", Duration::from_secs(5))
            .expect_exit_code(Some(0));

        let outcome = executor
            .execute(Path::new("task"), Workspace::new().unwrap(), &request)
            .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.stdout, "hello\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_named_container_and_removes_workspace() {
        let (engine, executor) = executor(FakeEngine {
            hang: true,
            ..Default::default()
        });
        let workspace = Workspace::new().unwrap();
        let path = workspace.path().to_path_buf();
        let request =
            ExecutionRequest::new(CommandKind::Grade, "img", "loop.sh", Duration::from_millis(50));

        let outcome = executor.execute(Path::new("task"), workspace, &request).await;

        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            ValidationError::TimeoutKill { .. }
        ));
        assert!(outcome.grade.is_none());
        assert!(!path.exists());

        let calls = engine.calls();
        let run = calls.iter().find(|c| c.starts_with("run:")).unwrap();
        let killed = calls.iter().find(|c| c.starts_with("kill:")).unwrap();
        assert_eq!(run["run:".len()..], killed["kill:".len()..]);
    }

    #[tokio::test]
    async fn test_unanswered_kill_does_not_block() {
        let engine = Arc::new(FakeEngine {
            hang: true,
            stall: vec!["kill"],
            ..Default::default()
        });
        let config = ExecutorConfig {
            kill_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let executor = SandboxExecutor::new(engine.clone(), config);
        let workspace = Workspace::new().unwrap();
        let path = workspace.path().to_path_buf();
        let request =
            ExecutionRequest::new(CommandKind::Run, "img", "loop.sh", Duration::from_millis(50));

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(Path::new("task"), workspace, &request),
        )
        .await
        .unwrap();

        assert!(matches!(
            outcome.errors[..],
            [ValidationError::TimeoutKill { .. }]
        ));
        assert_eq!(engine.count("kill:"), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_grade_reads_artifact() {
        let (_, executor) = executor(FakeEngine {
            artifact: Some(r#"{"points": 2}"#.to_string()),
            ..Default::default()
        });
        let request =
            ExecutionRequest::new(CommandKind::Grade, "img", "grade.sh", Duration::from_secs(5));

        let outcome = executor
            .execute(Path::new("task"), Workspace::new().unwrap(), &request)
            .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.grade.map(|g| g.points), Some(2.0));
    }

    #[tokio::test]
    async fn test_artifact_read_despite_bad_exit_code() {
        let (_, executor) = executor(FakeEngine {
            exit_code: 1,
            artifact: Some(r#"{"points": 0}"#.to_string()),
            ..Default::default()
        });
        let request =
            ExecutionRequest::new(CommandKind::Grade, "img", "grade.sh", Duration::from_secs(5))
                .expect_exit_code(Some(0));

        let outcome = executor
            .execute(Path::new("task"), Workspace::new().unwrap(), &request)
            .await;

        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.grade.is_some());
    }

    #[tokio::test]
    async fn test_solve_runs_before_container() {
        let (engine, executor) = executor(FakeEngine {
            artifact: Some(r#"{"points": 3}"#.to_string()),
            artifact_requires: Some("script.py".to_string()),
            ..Default::default()
        });
        let workspace = Workspace::new().unwrap();
        std::fs::write(workspace.path().join("solution.py"), "pass").unwrap();
        let request =
            ExecutionRequest::new(CommandKind::Grade, "img", "grade.sh", Duration::from_secs(5))
                .with_solve(Some("cp solution.py script.py"));

        let outcome = executor.execute(Path::new("task"), workspace, &request).await;

        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.grade.map(|g| g.points), Some(3.0));
        assert_eq!(engine.count("run:"), 1);
    }

    #[tokio::test]
    async fn test_failing_solve_skips_container() {
        let (engine, executor) = executor(FakeEngine::default());
        let request =
            ExecutionRequest::new(CommandKind::Test, "img", "test.sh", Duration::from_secs(5))
                .with_solve(Some("exit 2"));

        let outcome = executor
            .execute(Path::new("task"), Workspace::new().unwrap(), &request)
            .await;

        assert!(matches!(
            outcome.errors[..],
            [ValidationError::SolveFailed { .. }]
        ));
        assert_eq!(engine.count("run:"), 0);
    }

    #[test]
    fn test_container_names_are_unique() {
        let a = container_name(CommandKind::Run);
        let b = container_name(CommandKind::Run);
        assert!(a.starts_with("access-run-"));
        assert_ne!(a, b);
    }
}
