//! Grading through the task's own grade command

use std::path::Path;

use async_trait::async_trait;

use super::{GradeOutcome, Grader};
use crate::core::{CommandKind, GradeVariant, ValidationError, ValidationReport};
use crate::executor::{ExecutionRequest, SandboxExecutor};
use crate::task::TaskDescriptor;
use crate::workspace::{stage, StagePlan};

/// Runs `grade_command` in a container and reads back its artifact
pub struct ContainerGrader<'a> {
    executor: &'a SandboxExecutor,
    solve_command: Option<&'a str>,
    global_files: &'a [String],
    course_root: Option<&'a Path>,
}

impl<'a> ContainerGrader<'a> {
    pub fn new(executor: &'a SandboxExecutor) -> Self {
        Self {
            executor,
            solve_command: None,
            global_files: &[],
            course_root: None,
        }
    }

    pub fn with_solve_command(mut self, solve_command: Option<&'a str>) -> Self {
        self.solve_command = solve_command;
        self
    }

    pub fn with_global_files(mut self, files: &'a [String], course_root: Option<&'a Path>) -> Self {
        self.global_files = files;
        self.course_root = course_root;
        self
    }
}

#[async_trait]
impl Grader for ContainerGrader<'_> {
    fn name(&self) -> &'static str {
        "grade_command"
    }

    async fn grade(
        &mut self,
        task: &TaskDescriptor,
        variant: GradeVariant,
        report: &mut ValidationReport,
    ) -> Result<Option<GradeOutcome>, ValidationError> {
        let command = task
            .evaluator
            .command(CommandKind::Grade)
            .ok_or_else(|| ValidationError::invalid_config(&task.root, "no grade_command declared"))?;

        let solving = variant == GradeVariant::Solution;
        let solve = if solving {
            Some(self.solve_command.ok_or_else(|| {
                ValidationError::invalid_config(
                    &task.root,
                    "grading the solution requires a solve command",
                )
            })?)
        } else {
            None
        };

        let plan = StagePlan::new(CommandKind::Grade)
            .with_solution(solving)
            .with_global_files(self.global_files, self.course_root);
        let staged = stage(task, &plan).await?;
        report.extend(staged.errors);

        let request = ExecutionRequest::new(
            CommandKind::Grade,
            &task.evaluator.docker_image,
            command,
            self.executor.config().command_timeout,
        )
        .with_solve(solve);

        let outcome = self
            .executor
            .execute(&task.root, staged.workspace, &request)
            .await;

        // a grader that never finished is not "no result"; report why instead
        let mut errors = outcome.errors.into_iter();
        if let Some(first) = errors.next() {
            report.extend(errors);
            return Err(first);
        }

        Ok(outcome.grade)
    }
}
