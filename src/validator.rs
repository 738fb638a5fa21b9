//! Task validation
//!
//! Drives one task through the whole check sequence and collects every
//! problem in a single `ValidationReport`:
//! 1. config and file manifest checks
//! 2. run command on the template (expected exit code from the caller)
//! 3. test command on the template (expected exit code from the caller)
//! 4. test command on the solution (must pass)
//! 5. grade command on template and solution (0 and max points)
//! 6. AI grading of template and solution, for tasks with an `[llm]` section
//!
//! Commands the evaluator does not declare are skipped.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::assistant::{AssistantGrader, GradingService};
use crate::config::AssistantConfig;
use crate::core::{CommandKind, GradeVariant, ValidationError, ValidationReport};
use crate::executor::{ExecutionRequest, SandboxExecutor};
use crate::grading::{grade_and_check, ContainerGrader};
use crate::task::TaskDescriptor;
use crate::workspace::{stage, StagePlan};

/// Which checks to perform and what to expect from them
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Expected exit code of the run command on the template
    pub run: Option<i32>,
    /// Expected exit code of the test command on the template
    pub test: Option<i32>,
    pub test_solution: bool,
    pub grade_template: bool,
    pub grade_solution: bool,
    /// Host command turning the template into the solution
    pub solve_command: Option<String>,
    /// Course-level files staged for grading, relative to `course_root`
    pub global_files: Vec<String>,
    pub course_root: Option<PathBuf>,
    /// Skip all container steps
    pub llm_only: bool,
}

pub struct TaskValidator<'a, S: GradingService> {
    executor: &'a SandboxExecutor,
    service: &'a mut S,
    assistant: AssistantConfig,
    options: &'a ValidationOptions,
}

impl<'a, S: GradingService> TaskValidator<'a, S> {
    pub fn new(
        executor: &'a SandboxExecutor,
        service: &'a mut S,
        assistant: AssistantConfig,
        options: &'a ValidationOptions,
    ) -> Self {
        Self {
            executor,
            service,
            assistant,
            options,
        }
    }

    /// Validate the task in `dir`
    pub async fn validate(&mut self, dir: &Path) -> ValidationReport {
        let mut report = ValidationReport::new();
        info!("Validating task {:?}", dir);

        let task = match TaskDescriptor::load(dir) {
            Ok(task) => task,
            Err(e) => {
                report.error(e);
                return report;
            }
        };

        let violations = task.check_manifest();
        if violations.is_empty() {
            report.pass(format!("{:?} file manifest", dir));
        } else {
            report.extend(violations);
        }

        if !self.options.llm_only {
            self.container_steps(&task, &mut report).await;
        }

        if task.llm.is_some() {
            self.llm_steps(&task, &mut report).await;
        } else if self.options.llm_only {
            debug!("{:?} has no [llm] section, nothing to grade", dir);
        }

        report
    }

    async fn container_steps(&self, task: &TaskDescriptor, report: &mut ValidationReport) {
        if let Some(code) = self.options.run {
            self.check_command(task, report, CommandKind::Run, code, false)
                .await;
        }
        if let Some(code) = self.options.test {
            self.check_command(task, report, CommandKind::Test, code, false)
                .await;
        }
        if self.options.test_solution {
            self.check_command(task, report, CommandKind::Test, 0, true)
                .await;
        }

        if task.evaluator.command(CommandKind::Grade).is_none() {
            debug!("{:?} declares no grade_command, skipping", task.root);
            return;
        }
        for variant in self.requested_variants() {
            let mut grader = ContainerGrader::new(self.executor)
                .with_solve_command(self.options.solve_command.as_deref())
                .with_global_files(&self.options.global_files, self.options.course_root.as_deref());
            grade_and_check(&mut grader, task, variant, report).await;
        }
    }

    async fn llm_steps(&mut self, task: &TaskDescriptor, report: &mut ValidationReport) {
        for variant in self.requested_variants() {
            let mut grader = AssistantGrader::new(&mut *self.service, self.assistant.clone());
            grade_and_check(&mut grader, task, variant, report).await;
        }
    }

    fn requested_variants(&self) -> Vec<GradeVariant> {
        let mut variants = Vec::new();
        if self.options.grade_template {
            variants.push(GradeVariant::Template);
        }
        if self.options.grade_solution {
            variants.push(GradeVariant::Solution);
        }
        variants
    }

    /// Run `kind` on the template (or the solution) and compare its exit code
    async fn check_command(
        &self,
        task: &TaskDescriptor,
        report: &mut ValidationReport,
        kind: CommandKind,
        expected: i32,
        on_solution: bool,
    ) {
        let Some(command) = task.evaluator.command(kind) else {
            debug!("{:?} declares no {}, skipping", task.root, kind);
            return;
        };

        let solve = if on_solution {
            match self.options.solve_command.as_deref() {
                Some(solve) => Some(solve),
                None => {
                    report.error(ValidationError::invalid_config(
                        &task.root,
                        format!("running {} on the solution requires a solve command", kind),
                    ));
                    return;
                }
            }
        } else {
            None
        };

        let plan = StagePlan::new(kind).with_solution(on_solution);
        let staged = match stage(task, &plan).await {
            Ok(staged) => staged,
            Err(e) => {
                report.error(e);
                return;
            }
        };
        report.extend(staged.errors);

        let request = ExecutionRequest::new(
            kind,
            &task.evaluator.docker_image,
            command,
            self.executor.config().command_timeout,
        )
        .expect_exit_code(Some(expected))
        .with_solve(solve);

        let outcome = self
            .executor
            .execute(&task.root, staged.workspace, &request)
            .await;

        if outcome.errors.is_empty() {
            let target = if on_solution { "solution" } else { "template" };
            report.pass(format!(
                "{} on the {} exited with {}",
                kind, target, expected
            ));
        } else {
            report.extend(outcome.errors);
        }
    }
}
