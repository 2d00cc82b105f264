//! Writes processed content back to disk and advances progress

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ProcessedResult;
use crate::error::{PipelineError, Result};

use super::context::PipelineContext;
use super::stage::StageHandler;

pub struct ApplyStage {
    ctx: Arc<PipelineContext>,
}

impl ApplyStage {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for ApplyStage {
    type Task = Arc<ProcessedResult>;

    fn name(&self) -> &'static str {
        "apply"
    }

    fn drops_file_on_error(&self) -> bool {
        true
    }

    async fn handle(&self, result: Arc<ProcessedResult>) -> Result<()> {
        result.validate()?;

        tokio::fs::write(result.path(), result.processed())
            .await
            .map_err(|e| {
                PipelineError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to write {}: {}", result.path().display(), e),
                ))
            })?;

        let snapshot = self.ctx.progress().record_completion();
        log::info!(
            "Applied {} ({}/{})",
            result.path().display(),
            snapshot.completed,
            snapshot.total
        );
        self.ctx.presenter().update_progress(snapshot.percent());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::Stage;
    use crate::presenter::RecordingPresenter;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_file_and_reports_progress() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.py");
        std::fs::write(&path, "print(1)").unwrap();

        let presenter = Arc::new(RecordingPresenter::new());
        let ctx = Arc::new(PipelineContext::new(presenter.clone(), false));
        ctx.progress().reset(2);
        let stage = Stage::spawn(ApplyStage::new(ctx.clone()), ctx.clone());

        let result = ProcessedResult::new(&path, "print(1)", "print(1)  # ok").unwrap();
        stage.enqueue(Arc::new(result)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print(1)  # ok");
        assert_eq!(ctx.progress().snapshot().completed, 1);
        assert_eq!(presenter.last_progress(), Some(50.0));
    }

    #[tokio::test]
    async fn test_write_failure_counts_as_drop() {
        let temp = TempDir::new().unwrap();
        // A directory cannot be overwritten as a file
        let path = temp.path().join("dir.py");
        std::fs::create_dir(&path).unwrap();

        let presenter = Arc::new(RecordingPresenter::new());
        let ctx = Arc::new(PipelineContext::new(presenter.clone(), false));
        ctx.progress().reset(1);
        let stage = Stage::spawn(ApplyStage::new(ctx.clone()), ctx.clone());

        let result = ProcessedResult::new(&path, "a", "b").unwrap();
        stage.enqueue(Arc::new(result)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = ctx.progress().snapshot();
        assert_eq!((snapshot.completed, snapshot.dropped), (0, 1));
        assert!(snapshot.is_settled());
        assert_eq!(presenter.last_progress(), None);
        let errors = presenter.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("dir.py"));
    }
}
