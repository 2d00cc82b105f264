//! The staged processing pipeline
//!
//! ```text
//! submit -> ingest -> inference -+-> apply      (overwrite, progress)
//!                                +-> evolution  (score, save, maybe optimize)
//! ```
//!
//! Every stage is one FIFO queue drained by one tokio task. Inference fans
//! the same immutable result out to apply and evolution, which run
//! independently of each other.

mod apply;
mod context;
mod evolution;
mod inference;
mod ingest;
mod optimize;
mod progress;
mod stage;

pub use apply::ApplyStage;
pub use context::PipelineContext;
pub use evolution::{EvolutionStage, compute_diff, score_diff};
pub use inference::{InferenceStage, compose_request};
pub use ingest::{IngestStage, check_submission};
pub use optimize::{Optimizer, parse_reply};
pub use progress::{ProgressMonitor, ProgressSnapshot, ProgressState};
pub use stage::{Stage, StageHandler, StageSender};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::domain::{InferenceTask, IngestTask, Instruction, ProcessedResult};
use crate::error::{PipelineError, Result};
use crate::llm::LlmClient;
use crate::presenter::Presenter;
use crate::storage::{AnalysisStore, InstructionStore};

/// Running pipeline: four stages, the optimizer, and the progress monitor
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    config: Config,
    ingest: Stage<IngestTask>,
    inference: Stage<InferenceTask>,
    apply: Stage<Arc<ProcessedResult>>,
    evolution: Stage<Arc<ProcessedResult>>,
    optimizer: Arc<Optimizer>,
    monitor: Mutex<Option<ProgressMonitor>>,
}

impl Pipeline {
    /// Spawn every stage worker and the monitor; needs a tokio runtime
    pub fn start(
        config: Config,
        client: Arc<dyn LlmClient>,
        instructions: Arc<dyn InstructionStore>,
        analysis: AnalysisStore,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let ctx = Arc::new(PipelineContext::new(Arc::clone(&presenter), config.pipeline.auto_tune));

        let optimizer = Arc::new(Optimizer::new(
            Arc::clone(&client),
            instructions,
            Arc::clone(&ctx),
            config.optimizer.clone(),
        ));

        // Downstream first so upstream stages can hold their senders
        let apply = Stage::spawn(ApplyStage::new(Arc::clone(&ctx)), Arc::clone(&ctx));
        let evolution = Stage::spawn(
            EvolutionStage::new(
                Arc::clone(&ctx),
                analysis,
                Arc::clone(&optimizer),
                config.pipeline.clone(),
            ),
            Arc::clone(&ctx),
        );
        let inference = Stage::spawn(
            InferenceStage::new(client, config.endpoint.clone(), apply.sender(), evolution.sender()),
            Arc::clone(&ctx),
        );
        let ingest = Stage::spawn(IngestStage::new(inference.sender()), Arc::clone(&ctx));

        let monitor = ProgressMonitor::spawn(
            Arc::clone(ctx.progress()),
            presenter,
            config.pipeline.poll_interval(),
        );

        log::info!("Pipeline started");
        Self {
            ctx,
            config,
            ingest,
            inference,
            apply,
            evolution,
            optimizer,
            monitor: Mutex::new(Some(monitor)),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    pub fn set_active_instruction(&self, instruction: Instruction) {
        self.ctx.set_instruction(Arc::new(instruction));
    }

    pub fn active_instruction(&self) -> Option<Arc<Instruction>> {
        self.ctx.active_instruction()
    }

    pub fn set_auto_tune(&self, enabled: bool) {
        self.ctx.set_auto_tune(enabled);
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.ctx.progress().snapshot()
    }

    /// Queue one file for processing
    ///
    /// Rejects missing paths, non-files, and unsupported extensions.
    pub fn submit(&self, path: impl AsRef<Path>, instruction: Arc<Instruction>) -> Result<()> {
        let path = path.as_ref();
        check_submission(path, &self.config.pipeline)?;
        self.ingest.enqueue(IngestTask::new(path, instruction))
    }

    /// Reset progress to `paths.len()`, activate `instruction`, submit each path
    ///
    /// Rejected paths are reported and counted as dropped; the total is not
    /// reduced. Returns the number of accepted paths.
    pub fn start_batch(&self, paths: &[PathBuf], instruction: Instruction) -> Result<usize> {
        instruction.validate()?;
        let instruction = Arc::new(instruction);

        self.ctx.set_instruction(Arc::clone(&instruction));
        self.ctx.progress().reset(paths.len());
        self.ctx
            .report_status(&format!("Processing {} file(s) with '{}'", paths.len(), instruction.name));

        let mut accepted = 0;
        for path in paths {
            match self.submit(path, Arc::clone(&instruction)) {
                Ok(()) => accepted += 1,
                Err(e @ PipelineError::Stopped(_)) => return Err(e),
                Err(e) => {
                    log::warn!("Rejected {}: {}", path.display(), e);
                    self.ctx.progress().record_drop();
                    self.ctx.report_error("submit", &e);
                }
            }
        }
        Ok(accepted)
    }

    /// Resolve once every file of the current batch is applied or dropped
    ///
    /// A fully applied batch also waits for the monitor's completion signal.
    pub async fn wait_for_batch(&self) {
        let interval = self.config.pipeline.poll_interval();
        loop {
            let snapshot = self.ctx.progress().snapshot();
            if !snapshot.active || (snapshot.dropped > 0 && snapshot.is_settled()) {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Like [`Self::wait_for_batch`] but gives up after `limit`
    pub async fn wait_for_batch_timeout(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_for_batch()).await.is_ok()
    }

    /// Optimize the active instruction now, regardless of scores
    pub async fn optimize_now(&self) -> Result<Instruction> {
        self.optimizer.optimize_and_report().await
    }

    /// Stop every stage and the monitor, then wait for all of them
    ///
    /// In-flight tasks finish; queued tasks are dropped.
    pub async fn stop(&self) {
        self.ingest.stop();
        self.inference.stop();
        self.apply.stop();
        self.evolution.stop();

        futures::join!(
            self.ingest.join(),
            self.inference.join(),
            self.apply.join(),
            self.evolution.join(),
        );

        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        log::info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::presenter::RecordingPresenter;
    use crate::storage::FileInstructionStore;
    use tempfile::TempDir;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.pipeline.poll_interval_ms = 10;
        config
    }

    fn start(client: MockLlmClient, temp: &TempDir) -> (Pipeline, Arc<RecordingPresenter>) {
        let presenter = Arc::new(RecordingPresenter::new());
        let pipeline = Pipeline::start(
            test_config(),
            Arc::new(client),
            Arc::new(FileInstructionStore::new(temp.path().join("prompts")).unwrap()),
            AnalysisStore::new(temp.path().join("evolution_data")).unwrap(),
            presenter.clone(),
        );
        (pipeline, presenter)
    }

    #[tokio::test]
    async fn test_submit_rejects_unsupported() {
        let temp = TempDir::new().unwrap();
        let (pipeline, _presenter) = start(MockLlmClient::default(), &temp);
        let blob = temp.path().join("x.bin");
        std::fs::write(&blob, "data").unwrap();

        let instruction = Arc::new(Instruction::new("doc", "p", "n"));
        assert!(matches!(
            pipeline.submit(&blob, instruction),
            Err(PipelineError::UnsupportedFile(_))
        ));
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_start_batch_counts_all_paths() {
        let temp = TempDir::new().unwrap();
        let client = MockLlmClient::responding(|r| Ok(format!("{}  # ok", r.messages[1].content)));
        let (pipeline, presenter) = start(client, &temp);
        let good = temp.path().join("a.py");
        std::fs::write(&good, "a = 1").unwrap();
        pipeline.set_auto_tune(false);

        let accepted = pipeline
            .start_batch(&[good, temp.path().join("missing.py")], Instruction::new("doc", "p", "n"))
            .unwrap();

        assert_eq!(accepted, 1);
        assert_eq!(pipeline.progress().total, 2);
        assert_eq!(pipeline.progress().dropped, 1);
        assert_eq!(pipeline.active_instruction().unwrap().name, "doc");
        assert_eq!(presenter.errors().len(), 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_start_batch_rejects_incomplete_instruction() {
        let temp = TempDir::new().unwrap();
        let (pipeline, _presenter) = start(MockLlmClient::default(), &temp);

        let result = pipeline.start_batch(&[], Instruction::new("doc", "p", ""));

        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert!(pipeline.active_instruction().is_none());
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_submit_after_stop() {
        let temp = TempDir::new().unwrap();
        let (pipeline, _presenter) = start(MockLlmClient::default(), &temp);
        let file = temp.path().join("a.py");
        std::fs::write(&file, "a = 1").unwrap();

        pipeline.stop().await;

        let instruction = Arc::new(Instruction::new("doc", "p", "n"));
        assert!(matches!(
            pipeline.submit(&file, instruction),
            Err(PipelineError::Stopped("ingest"))
        ));
    }
}
