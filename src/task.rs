//! Task descriptor loaded from a task's `config.toml`
//!
//! Only the parts the execution core needs are modelled here: the file
//! manifest, the evaluator commands, the point ceiling, and the optional
//! AI-grading section.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{CommandKind, ValidationError};

pub const CONFIG_FILE: &str = "config.toml";

/// Four-way partition of a task's files by role
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub visible: Vec<String>,
    #[serde(default)]
    pub editable: Vec<String>,
    #[serde(default)]
    pub grading: Vec<String>,
    #[serde(default)]
    pub solution: Vec<String>,
}

impl FileManifest {
    /// All referenced files, deduplicated
    pub fn all(&self) -> BTreeSet<&str> {
        self.visible
            .iter()
            .chain(&self.editable)
            .chain(&self.grading)
            .chain(&self.solution)
            .map(String::as_str)
            .collect()
    }
}

/// Container image and the commands declared for it
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorSpec {
    pub docker_image: String,
    pub run_command: Option<String>,
    pub test_command: Option<String>,
    pub grade_command: Option<String>,
}

impl EvaluatorSpec {
    pub fn command(&self, kind: CommandKind) -> Option<&str> {
        let cmd = match kind {
            CommandKind::Run => &self.run_command,
            CommandKind::Test => &self.test_command,
            CommandKind::Grade => &self.grade_command,
        };
        cmd.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// `[llm]` section driving AI-assisted grading
#[derive(Debug, Clone, Deserialize)]
pub struct LlmGradingSpec {
    pub submission: String,
    pub solution: Option<String>,
    pub rubrics: Option<String>,
    pub examples: Option<String>,
    pub pre: Option<String>,
    pub post: Option<String>,
    pub prompt: Option<String>,
    pub model_family: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub voting: Option<u32>,
    #[serde(default)]
    pub cot: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawInformation {
    instructions_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTaskConfig {
    max_points: f64,
    #[serde(default)]
    information: std::collections::HashMap<String, RawInformation>,
    evaluator: EvaluatorSpec,
    #[serde(default)]
    files: FileManifest,
    llm: Option<LlmGradingSpec>,
}

/// Fully parsed task, handed to the execution core
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub root: PathBuf,
    pub max_points: f64,
    /// English instructions file, relative to `root`
    pub instructions_file: Option<String>,
    pub files: FileManifest,
    pub evaluator: EvaluatorSpec,
    pub llm: Option<LlmGradingSpec>,
}

impl TaskDescriptor {
    /// Load `<dir>/config.toml`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ValidationError::invalid_config(dir, format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(dir, &content)
    }

    pub fn from_toml(dir: impl AsRef<Path>, content: &str) -> Result<Self, ValidationError> {
        let dir = dir.as_ref();
        let raw: RawTaskConfig = toml::from_str(content).map_err(|e| {
            ValidationError::invalid_config(dir, format!("{} schema errors: {}", CONFIG_FILE, e))
        })?;

        let instructions_file = raw
            .information
            .get("en")
            .and_then(|info| info.instructions_file.clone());

        Ok(Self {
            root: dir.to_path_buf(),
            max_points: raw.max_points,
            instructions_file,
            files: raw.files,
            evaluator: raw.evaluator,
            llm: raw.llm,
        })
    }

    /// Check that referenced files exist and that file roles are consistent.
    pub fn check_manifest(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let violation = |message: String| ValidationError::ManifestViolation {
            task: self.root.clone(),
            message,
        };

        for file in self.files.all() {
            if !self.root.join(file).is_file() {
                errors.push(violation(format!(
                    "files references non-existing file: {}",
                    file
                )));
            }
        }

        for file in self.files.grading.iter().chain(&self.files.solution) {
            if self.files.editable.contains(file) {
                errors.push(violation(format!("{} marked as editable", file)));
            }
            if self.files.visible.contains(file) {
                errors.push(violation(format!(
                    "grading or solution file {} marked as visible",
                    file
                )));
            }
        }

        for file in &self.files.editable {
            if !self.files.visible.contains(file) {
                errors.push(violation(format!("invisible file {} marked as editable", file)));
            }
        }

        errors
    }
}
