use serde::{Deserialize, Serialize};
use std::fmt;

/// Which evaluator command an execution belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Run,
    Test,
    Grade,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandKind::Run => "run_command",
            CommandKind::Test => "test_command",
            CommandKind::Grade => "grade_command",
        };
        write!(f, "{}", s)
    }
}

/// Subject of a grading attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeVariant {
    /// The unsolved template, expected to score 0
    Template,
    /// The reference solution, expected to score max_points
    Solution,
}

impl GradeVariant {
    pub fn expected_points(&self, max_points: f64) -> f64 {
        match self {
            GradeVariant::Template => 0.0,
            GradeVariant::Solution => max_points,
        }
    }
}

impl fmt::Display for GradeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GradeVariant::Template => "template",
            GradeVariant::Solution => "solution",
        };
        write!(f, "{}", s)
    }
}
