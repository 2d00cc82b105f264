//! Instruction self-tuning
//!
//! Asks the endpoint for a better version of the active instruction and
//! stores the answer as a brand-new named instruction. The active instruction
//! is never edited and the new one is not activated.

use std::sync::Arc;

use chrono::Local;

use crate::config::OptimizerConfig;
use crate::domain::{Instruction, InstructionParts};
use crate::error::{PipelineError, Result};
use crate::id::{optimized_name, with_attempt};
use crate::llm::{CompletionRequest, LlmClient};
use crate::storage::InstructionStore;

use super::context::PipelineContext;

const OPTIMIZE_PROMPT: &str = "Optimize this coding prompt while maintaining strict constraints:";
const REPLY_FORMAT: &str =
    "Reply with a single JSON object with exactly two string fields: \"positive\" and \"negative\".";

const MAX_NAME_ATTEMPTS: u32 = 100;

pub struct Optimizer {
    client: Arc<dyn LlmClient>,
    store: Arc<dyn InstructionStore>,
    ctx: Arc<PipelineContext>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        store: Arc<dyn InstructionStore>,
        ctx: Arc<PipelineContext>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            client,
            store,
            ctx,
            config,
        }
    }

    /// Improve the active instruction and persist the result
    pub async fn optimize(&self) -> Result<Instruction> {
        let active = self.ctx.active_instruction().ok_or(PipelineError::NoActiveInstruction)?;
        active.validate()?;

        let request = CompletionRequest::new()
            .with_system_message(OPTIMIZE_PROMPT)
            .with_system_message(REPLY_FORMAT)
            .with_user_message(serde_json::to_string(&active.parts())?)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_timeout(self.config.timeout());

        log::info!("Optimizing instruction '{}'", active.name);
        let response = self.client.complete(request).await?;
        let parts = parse_reply(&response.content)?;

        let base = optimized_name(&Local::now());
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate =
                Instruction::from_parts(with_attempt(&base, attempt), parts.clone()).with_language(active.language.clone());
            if self.store.create(&candidate)? {
                return Ok(candidate);
            }
        }

        Err(PipelineError::Storage(format!("no free instruction name for {}", base)))
    }

    /// Run [`Self::optimize`] and tell the presenter how it went
    pub async fn optimize_and_report(&self) -> Result<Instruction> {
        match self.optimize().await {
            Ok(instruction) => {
                log::info!("Instruction optimized and saved as {}", instruction.name);
                self.ctx
                    .report_status(&format!("Instruction optimized and saved as {}", instruction.name));
                Ok(instruction)
            }
            Err(e) => {
                self.ctx.report_error("optimization", &e);
                Err(e)
            }
        }
    }
}

/// Drop a surrounding Markdown code fence, if any
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Accept only a JSON object with non-blank string `positive` and `negative`
pub fn parse_reply(raw: &str) -> Result<InstructionParts> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| PipelineError::Schema(format!("optimization reply is not JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::Schema("optimization reply is not a JSON object".to_string()))?;

    let field = |name: &str| -> Result<String> {
        object
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Schema(format!("optimization reply lacks string field '{}'", name)))
    };

    let parts = InstructionParts {
        positive: field("positive")?,
        negative: field("negative")?,
    };
    parts
        .validate()
        .map_err(|e| PipelineError::Schema(format!("optimization reply rejected: {}", e)))?;
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::presenter::RecordingPresenter;
    use crate::storage::FileInstructionStore;
    use tempfile::TempDir;

    const GOOD_REPLY: &str = r#"{"positive": "Add precise comments", "negative": "Never alter code"}"#;

    struct Fixture {
        optimizer: Optimizer,
        ctx: Arc<PipelineContext>,
        store: Arc<FileInstructionStore>,
        client: Arc<MockLlmClient>,
        presenter: Arc<RecordingPresenter>,
        _temp: TempDir,
    }

    fn fixture(replies: Vec<Result<String>>) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileInstructionStore::new(temp.path()).unwrap());
        let client = Arc::new(MockLlmClient::new(replies));
        let presenter = Arc::new(RecordingPresenter::new());
        let ctx = Arc::new(PipelineContext::new(presenter.clone(), true));
        let optimizer = Optimizer::new(client.clone(), store.clone(), ctx.clone(), OptimizerConfig::default());
        Fixture {
            optimizer,
            ctx,
            store,
            client,
            presenter,
            _temp: temp,
        }
    }

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain = parse_reply(GOOD_REPLY).unwrap();
        assert_eq!(plain.positive, "Add precise comments");

        let fenced = parse_reply(&format!("```json\n{}\n```", GOOD_REPLY)).unwrap();
        assert_eq!(fenced, plain);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for raw in [
            "not json at all",
            r#"["positive", "negative"]"#,
            r#"{"positive": "only one"}"#,
            r#"{"positive": 1, "negative": "n"}"#,
            r#"{"positive": "p", "negative": "   "}"#,
        ] {
            assert!(matches!(parse_reply(raw), Err(PipelineError::Schema(_))), "accepted {}", raw);
        }
    }

    #[tokio::test]
    async fn test_optimize_creates_new_instruction() {
        let f = fixture(vec![Ok(GOOD_REPLY.to_string())]);
        let active = Instruction::new("doc", "Add comments", "Do not change code").with_language("Rust");
        f.store.save(&active).unwrap();
        f.ctx.set_instruction(Arc::new(active.clone()));

        let created = f.optimizer.optimize_and_report().await.unwrap();

        assert!(created.name.starts_with("optimized_"));
        assert_eq!(created.language, "Rust");
        assert_eq!(f.store.load(&created.name).unwrap(), Some(created.clone()));
        assert_eq!(f.store.load("doc").unwrap(), Some(active));
        assert_eq!(f.ctx.active_instruction().unwrap().name, "doc");
        assert!(f.presenter.statuses().iter().any(|s| s.contains(&created.name)));

        let request = &f.client.requests()[0];
        assert_eq!(request.messages[0].content, OPTIMIZE_PROMPT);
        let sent: InstructionParts = serde_json::from_str(&request.messages[2].content).unwrap();
        assert_eq!(sent.positive, "Add comments");
        assert_eq!(request.temperature, Some(0.5));
        assert_eq!(request.max_tokens, Some(2000));
    }

    #[tokio::test]
    async fn test_same_second_names_do_not_collide() {
        let f = fixture(vec![Ok(GOOD_REPLY.to_string()), Ok(GOOD_REPLY.to_string())]);
        f.ctx.set_instruction(Arc::new(Instruction::new("doc", "p", "n")));

        let first = f.optimizer.optimize().await.unwrap();
        let second = f.optimizer.optimize().await.unwrap();

        assert_ne!(first.name, second.name);
        assert_eq!(f.store.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_requires_active_instruction() {
        let f = fixture(vec![Ok(GOOD_REPLY.to_string())]);

        let err = f.optimizer.optimize_and_report().await.unwrap_err();

        assert!(matches!(err, PipelineError::NoActiveInstruction));
        assert_eq!(f.client.call_count(), 0);
        assert_eq!(f.presenter.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_active_instruction_rejected() {
        let f = fixture(vec![Ok(GOOD_REPLY.to_string())]);
        f.ctx.set_instruction(Arc::new(Instruction::new("doc", "", "")));

        assert!(matches!(
            f.optimizer.optimize().await,
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(f.client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_stores_nothing() {
        let f = fixture(vec![Ok("I think the prompt is fine".to_string())]);
        f.ctx.set_instruction(Arc::new(Instruction::new("doc", "p", "n")));

        let err = f.optimizer.optimize_and_report().await.unwrap_err();

        assert!(matches!(err, PipelineError::Schema(_)));
        assert!(f.store.list().unwrap().is_empty());
        assert_eq!(f.presenter.errors().len(), 1);
    }
}
