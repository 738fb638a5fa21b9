//! Grading module - one comparison for every grading backend
//!
//! Two backends produce a `GradeOutcome`:
//! - `ContainerGrader`: runs the task's grade command and reads the artifact
//!   it leaves in the workspace
//! - `AssistantGrader` (in `crate::assistant`): asks the AI grading service
//!
//! Both go through `interpret`, so "grader produced nothing" and "grader
//! disagrees with the rubric" are reported the same way for both.

pub mod artifact;
pub mod container;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{GradeVariant, ValidationError, ValidationReport};
use crate::task::TaskDescriptor;

pub use artifact::{read_artifact, GRADE_ARTIFACT};
pub use container::ContainerGrader;

/// Points and feedback of one grading attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub points: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A way of grading a task's template or reference solution
#[async_trait]
pub trait Grader: Send {
    /// Short label used in reports
    fn name(&self) -> &'static str;

    /// Grade `variant` of `task`.
    ///
    /// `Ok(None)` means the grader ran but produced no result. Non-fatal
    /// problems found along the way go to `report`.
    async fn grade(
        &mut self,
        task: &TaskDescriptor,
        variant: GradeVariant,
        report: &mut ValidationReport,
    ) -> Result<Option<GradeOutcome>, ValidationError>;
}

/// Compare a grading result against the expected points
pub fn interpret(
    task: &Path,
    grade: Option<&GradeOutcome>,
    expected: f64,
    variant: GradeVariant,
) -> Result<(), ValidationError> {
    let grade = grade.ok_or_else(|| ValidationError::GradingProducedNoResult {
        task: task.to_path_buf(),
        variant,
    })?;

    if (grade.points - expected).abs() > f64::EPSILON {
        return Err(ValidationError::PointMismatch {
            task: task.to_path_buf(),
            variant,
            expected,
            observed: grade.points,
        });
    }

    Ok(())
}

/// Grade `variant` with `grader` and record the comparison in `report`
pub async fn grade_and_check(
    grader: &mut dyn Grader,
    task: &TaskDescriptor,
    variant: GradeVariant,
    report: &mut ValidationReport,
) {
    let subject = format!("{} grading of the {}", grader.name(), variant);
    let expected = variant.expected_points(task.max_points);

    match grader.grade(task, variant, report).await {
        Ok(grade) => match interpret(&task.root, grade.as_ref(), expected, variant) {
            Ok(()) => report.pass(subject),
            Err(e) => report.error(e),
        },
        Err(e) => report.error(e),
    }
}
