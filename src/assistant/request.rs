//! Evaluation request sent to the grading service

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::AssistantConfig;
use crate::core::{GradeVariant, ValidationError};
use crate::task::{LlmGradingSpec, TaskDescriptor};

pub const DEFAULT_MODEL_FAMILY: &str = "claude";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_VOTING: u32 = 1;

/// Default model of a supported family
pub fn default_model(family: &str) -> Option<&'static str> {
    match family {
        "claude" => Some("claude-3-7-sonnet-latest"),
        "gpt" => Some("gpt-4o-mini"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: String,
    pub title: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub answer: String,
    pub points: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RubricsFile {
    #[serde(default)]
    rubrics: Vec<Rubric>,
}

#[derive(Debug, Default, Deserialize)]
struct ExamplesFile {
    #[serde(default)]
    examples: Vec<Example>,
}

/// Body of `POST /evaluate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub question: String,
    pub answer: String,
    pub llm_type: String,
    pub llm_model: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rubrics: Vec<Rubric>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Example>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub temperature: f64,
    pub voting_count: u32,
    pub chain_of_thought: bool,
    pub max_points: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl EvaluationRequest {
    /// Build the request grading `variant` of `task`.
    ///
    /// The template is graded through the `submission` file, the reference
    /// solution through the `solution` file.
    pub async fn for_task(
        task: &TaskDescriptor,
        variant: GradeVariant,
        config: &AssistantConfig,
    ) -> Result<Self, ValidationError> {
        let spec = task
            .llm
            .as_ref()
            .ok_or_else(|| ValidationError::invalid_config(&task.root, "no [llm] section"))?;

        check_hidden(task, spec)?;

        let family = spec
            .model_family
            .as_deref()
            .unwrap_or(DEFAULT_MODEL_FAMILY)
            .to_string();
        let family_default = default_model(&family).ok_or_else(|| {
            ValidationError::invalid_config(
                &task.root,
                format!("unknown llm model_family '{}' (expected claude or gpt)", family),
            )
        })?;
        let model = config
            .model_override
            .clone()
            .or_else(|| spec.model.clone())
            .unwrap_or_else(|| family_default.to_string());

        let answer_file = match variant {
            GradeVariant::Template => spec.submission.as_str(),
            GradeVariant::Solution => spec.solution.as_deref().ok_or_else(|| {
                ValidationError::invalid_config(
                    &task.root,
                    "grading the solution with llm requires [llm] solution",
                )
            })?,
        };

        let question = match &task.instructions_file {
            Some(file) => read(&task.root, file).await?,
            None => String::new(),
        };
        let answer = read(&task.root, answer_file).await?;

        let rubrics = match &spec.rubrics {
            Some(file) => parse::<RubricsFile>(&task.root, file).await?.rubrics,
            None => Vec::new(),
        };
        let examples = match &spec.examples {
            Some(file) => parse::<ExamplesFile>(&task.root, file).await?.examples,
            None => Vec::new(),
        };

        Ok(Self {
            question,
            answer,
            llm_type: family,
            llm_model: model,
            rubrics,
            examples,
            pre_prompt: read_opt(&task.root, spec.pre.as_deref()).await?,
            post_prompt: read_opt(&task.root, spec.post.as_deref()).await?,
            prompt: read_opt(&task.root, spec.prompt.as_deref()).await?,
            temperature: spec.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            voting_count: spec.voting.unwrap_or(DEFAULT_VOTING),
            chain_of_thought: spec.cot,
            max_points: task.max_points,
            api_key: config.api_key.clone(),
        })
    }
}

/// Instructor-only inputs must not be shown to students
fn check_hidden(task: &TaskDescriptor, spec: &LlmGradingSpec) -> Result<(), ValidationError> {
    let hidden = [
        &spec.solution,
        &spec.rubrics,
        &spec.examples,
        &spec.pre,
        &spec.post,
        &spec.prompt,
    ];
    for file in hidden.into_iter().flatten() {
        if task.files.visible.contains(file) || task.files.editable.contains(file) {
            return Err(ValidationError::ManifestViolation {
                task: task.root.clone(),
                message: format!("llm file {} must not be visible or editable", file),
            });
        }
    }
    Ok(())
}

async fn read(root: &Path, file: &str) -> Result<String, ValidationError> {
    tokio::fs::read_to_string(root.join(file))
        .await
        .map_err(|e| ValidationError::invalid_config(root, format!("cannot read llm file {}: {}", file, e)))
}

async fn read_opt(root: &Path, file: Option<&str>) -> Result<Option<String>, ValidationError> {
    match file {
        Some(file) => read(root, file).await.map(Some),
        None => Ok(None),
    }
}

async fn parse<T: serde::de::DeserializeOwned>(root: &Path, file: &str) -> Result<T, ValidationError> {
    let content = read(root, file).await?;
    toml::from_str(&content)
        .map_err(|e| ValidationError::invalid_config(root, format!("malformed {}: {}", file, e)))
}
