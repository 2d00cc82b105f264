//! Endpoint call per file, then fan-out to apply and evolution

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::domain::{InferenceTask, ProcessedResult};
use crate::error::Result;
use crate::llm::{CompletionRequest, LlmClient};

use super::stage::{StageHandler, StageSender};

/// Build the chat request for one file
///
/// Positive directive first, then the file, then the negative directive as
/// an explicit constraint.
pub fn compose_request(task: &InferenceTask, config: &EndpointConfig) -> CompletionRequest {
    CompletionRequest::new()
        .with_system_message(task.instruction.positive.clone())
        .with_user_message(task.content.clone())
        .with_system_message(format!("Constraints: {}", task.instruction.negative))
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_timeout(config.timeout())
}

pub struct InferenceStage {
    client: Arc<dyn LlmClient>,
    config: EndpointConfig,
    apply: StageSender<Arc<ProcessedResult>>,
    evolution: StageSender<Arc<ProcessedResult>>,
}

impl InferenceStage {
    pub fn new(
        client: Arc<dyn LlmClient>,
        config: EndpointConfig,
        apply: StageSender<Arc<ProcessedResult>>,
        evolution: StageSender<Arc<ProcessedResult>>,
    ) -> Self {
        Self {
            client,
            config,
            apply,
            evolution,
        }
    }
}

#[async_trait]
impl StageHandler for InferenceStage {
    type Task = InferenceTask;

    fn name(&self) -> &'static str {
        "inference"
    }

    fn drops_file_on_error(&self) -> bool {
        true
    }

    async fn handle(&self, task: InferenceTask) -> Result<()> {
        task.validate()?;

        let request = compose_request(&task, &self.config);
        log::info!(
            "Requesting rewrite of {} from {} ({} chars)",
            task.path.display(),
            self.client.model(),
            task.content.len()
        );
        let response = self.client.complete(request).await?;
        log::debug!("{}: {} tokens", task.path.display(), response.usage.total());

        let result = Arc::new(ProcessedResult::new(task.path, task.content, response.content)?);

        // Both consumers get the result even if one queue has gone away
        let applied = self.apply.enqueue(Arc::clone(&result));
        let evolved = self.evolution.enqueue(result);
        applied.and(evolved)
    }
}
