//! Submission checks and file reading

use std::path::Path;

use async_trait::async_trait;

use crate::config::PipelineConfig;
use crate::domain::{InferenceTask, IngestTask};
use crate::error::{PipelineError, Result};

use super::stage::{StageHandler, StageSender};

/// Accept only existing regular files with a supported extension
pub fn check_submission(path: &Path, config: &PipelineConfig) -> Result<()> {
    let is_file = std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
    if !is_file || !config.supports(path) {
        return Err(PipelineError::UnsupportedFile(path.to_path_buf()));
    }
    Ok(())
}

/// Reads accepted files and hands their content to inference
pub struct IngestStage {
    inference: StageSender<InferenceTask>,
}

impl IngestStage {
    pub fn new(inference: StageSender<InferenceTask>) -> Self {
        Self { inference }
    }
}

#[async_trait]
impl StageHandler for IngestStage {
    type Task = IngestTask;

    fn name(&self) -> &'static str {
        "ingest"
    }

    fn drops_file_on_error(&self) -> bool {
        true
    }

    async fn handle(&self, task: IngestTask) -> Result<()> {
        let content = tokio::fs::read_to_string(&task.path).await.map_err(|e| {
            PipelineError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", task.path.display(), e),
            ))
        })?;

        log::debug!("Read {} ({} bytes)", task.path.display(), content.len());
        self.inference
            .enqueue(InferenceTask::new(task.path, content, task.instruction))
    }
}
