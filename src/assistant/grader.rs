//! AI-assisted grading backend

use async_trait::async_trait;
use tracing::info;

use super::client::AssistantClient;
use super::request::EvaluationRequest;
use super::service::GradingService;
use crate::config::AssistantConfig;
use crate::core::{GradeVariant, ValidationError, ValidationReport};
use crate::grading::{GradeOutcome, Grader};
use crate::task::TaskDescriptor;

/// Grades through the AI grading service; the service is stopped after
/// every grading attempt
pub struct AssistantGrader<'a, S: GradingService> {
    service: &'a mut S,
    config: AssistantConfig,
}

impl<'a, S: GradingService> AssistantGrader<'a, S> {
    pub fn new(service: &'a mut S, config: AssistantConfig) -> Self {
        Self { service, config }
    }

    async fn run(
        &mut self,
        task: &TaskDescriptor,
        variant: GradeVariant,
    ) -> Result<Option<GradeOutcome>, ValidationError> {
        let request = EvaluationRequest::for_task(task, variant, &self.config).await?;
        let handle = self.service.start().await?;

        info!(
            "Grading the {} of {:?} with {} ({})",
            variant, task.root, request.llm_model, handle.base_url
        );
        let client = AssistantClient::new(&handle.base_url, self.config.request_timeout);
        let job_id = client.submit(&request).await?;
        client
            .poll(&job_id, self.config.poll_interval, self.config.poll_attempts)
            .await
    }
}

#[async_trait]
impl<S: GradingService> Grader for AssistantGrader<'_, S> {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn grade(
        &mut self,
        task: &TaskDescriptor,
        variant: GradeVariant,
        _report: &mut ValidationReport,
    ) -> Result<Option<GradeOutcome>, ValidationError> {
        let result = self.run(task, variant).await;
        self.service.stop().await;
        result
    }
}
