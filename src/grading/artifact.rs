//! Grading artifact left in the workspace by a grade command

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;

use super::GradeOutcome;

/// Well-known artifact name at the workspace root
pub const GRADE_ARTIFACT: &str = "grade_results.json";

#[derive(Debug, Deserialize)]
struct RawArtifact {
    points: f64,
    #[serde(default)]
    feedback: Option<Value>,
    #[serde(default)]
    hints: Option<Value>,
    #[serde(default)]
    hint: Option<String>,
}

/// Read the grading artifact from `workspace`.
///
/// `Ok(None)` if the grade command did not write one; `Err` if it wrote
/// something without a numeric `points` field.
pub async fn read_artifact(workspace: &Path) -> Result<Option<GradeOutcome>> {
    let path = workspace.join(GRADE_ARTIFACT);
    let content = match fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };

    let raw: RawArtifact = serde_json::from_slice(&content)
        .with_context(|| format!("Malformed grading artifact {}", GRADE_ARTIFACT))?;

    let feedback = raw
        .feedback
        .or(raw.hints)
        .map(|v| flatten_text(&v))
        .unwrap_or_default();

    Ok(Some(GradeOutcome {
        points: raw.points,
        feedback,
        hint: raw.hint,
    }))
}

fn flatten_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(flatten_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_artifact(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_points_and_hints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(GRADE_ARTIFACT),
            r#"{"points": 1.5, "hints": ["check the loop", "off by one"]}"#,
        )
        .unwrap();

        let grade = read_artifact(dir.path()).await.unwrap().unwrap();
        assert_eq!(grade.points, 1.5);
        assert_eq!(grade.feedback, "check the loop\noff by one");
        assert_eq!(grade.hint, None);
    }

    #[tokio::test]
    async fn test_integer_points() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GRADE_ARTIFACT), r#"{"points": 2}"#).unwrap();
        let grade = read_artifact(dir.path()).await.unwrap().unwrap();
        assert_eq!(grade.points, 2.0);
    }

    #[tokio::test]
    async fn test_missing_points_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GRADE_ARTIFACT), r#"{"feedback": "nice"}"#).unwrap();
        assert!(read_artifact(dir.path()).await.is_err());
    }
}
