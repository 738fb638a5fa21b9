//! Validation errors and the report they accumulate into
//!
//! Every error carries enough context (task path, command, expected vs.
//! observed values) to be actionable from the printed message alone.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use super::kind::{CommandKind, GradeVariant};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{task}: referenced file {file} does not exist")]
    MissingStagedFile { task: PathBuf, file: String },

    #[error("{task}: {command} exceeded the {}s timeout and was killed", timeout.as_secs_f64())]
    TimeoutKill {
        task: PathBuf,
        command: CommandKind,
        timeout: Duration,
    },

    #[error("{task}: {command} Expected returncode {expected} but got {observed}")]
    UnexpectedReturnCode {
        task: PathBuf,
        command: CommandKind,
        expected: i32,
        observed: i32,
    },

    #[error("{task}: grading the {variant} produced no result")]
    GradingProducedNoResult { task: PathBuf, variant: GradeVariant },

    #[error("{task}: {observed} points awarded instead of expected {expected} for the {variant}")]
    PointMismatch {
        task: PathBuf,
        variant: GradeVariant,
        expected: f64,
        observed: f64,
    },

    #[error("{task}: solve command failed before {command}: {reason}")]
    SolveFailed {
        task: PathBuf,
        command: CommandKind,
        reason: String,
    },

    #[error("{task}: container runtime failed for {command}: {reason}")]
    ContainerRuntime {
        task: PathBuf,
        command: CommandKind,
        reason: String,
    },

    #[error("{task}: cannot prepare workspace: {reason}")]
    Workspace { task: PathBuf, reason: String },

    #[error("grading service failed to start: {0}")]
    ServiceStartFailure(String),

    #[error("grading job {0} is unknown to the grading service")]
    JobNotFound(String),

    #[error("grading job {job_id} did not finish after {attempts} polls")]
    JobTimeout { job_id: String, attempts: u32 },

    #[error("grading service request failed ({context}): {source}")]
    NetworkError {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{task}: {message}")]
    InvalidConfig { task: PathBuf, message: String },

    #[error("{task}: {message}")]
    ManifestViolation { task: PathBuf, message: String },
}

impl ValidationError {
    pub fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        ValidationError::NetworkError {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_config(task: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ValidationError::InvalidConfig {
            task: task.into(),
            message: message.into(),
        }
    }
}

/// Accumulated outcome of validating one task
///
/// Errors never abort the batch; the caller sees every problem in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub passed: Vec<String>,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&mut self, subject: impl Into<String>) {
        let subject = subject.into();
        info!("✓ {}", subject);
        self.passed.push(subject);
    }

    pub fn error(&mut self, error: ValidationError) {
        warn!("✗ {}", error);
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        for error in errors {
            self.error(error);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_message_names_both_values() {
        let err = ValidationError::UnexpectedReturnCode {
            task: PathBuf::from("tasks/hello"),
            command: CommandKind::Run,
            expected: 0,
            observed: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("Expected returncode 0 but got 1"));
        assert!(msg.contains("tasks/hello"));
        assert!(msg.contains("run_command"));
    }

    #[test]
    fn test_point_mismatch_message() {
        let err = ValidationError::PointMismatch {
            task: PathBuf::from("t"),
            variant: GradeVariant::Solution,
            expected: 2.0,
            observed: 1.0,
        };
        assert!(err
            .to_string()
            .contains("1 points awarded instead of expected 2 for the solution"));
    }

    #[test]
    fn test_report_accumulates() {
        let mut report = ValidationReport::new();
        report.pass("run_command");
        assert!(report.is_valid());

        report.error(ValidationError::JobNotFound("abc".into()));
        report.error(ValidationError::ServiceStartFailure("boom".into()));
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.passed, vec!["run_command".to_string()]);
    }
}
