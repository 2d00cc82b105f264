//! Work items passed between pipeline stages
//!
//! Each item is owned by exactly one queue or worker at a time. The one value
//! that fans out, [`ProcessedResult`], is shared behind an `Arc` and has no
//! mutating API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::Instruction;
use crate::error::{PipelineError, Result};

/// A path accepted for processing, with the instruction active at submission
#[derive(Debug, Clone)]
pub struct IngestTask {
    pub path: PathBuf,
    pub instruction: Arc<Instruction>,
}

impl IngestTask {
    pub fn new(path: impl Into<PathBuf>, instruction: Arc<Instruction>) -> Self {
        Self {
            path: path.into(),
            instruction,
        }
    }
}

/// File content read from disk, ready to be sent to the endpoint
#[derive(Debug, Clone)]
pub struct InferenceTask {
    pub path: PathBuf,
    pub content: String,
    pub instruction: Arc<Instruction>,
}

impl InferenceTask {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>, instruction: Arc<Instruction>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            instruction,
        }
    }

    /// Path must be set and the instruction must carry both directives
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(PipelineError::Validation("inference task has no file path".to_string()));
        }
        self.instruction.validate()
    }
}

/// Original and rewritten content of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedResult {
    path: PathBuf,
    original: String,
    processed: String,
}

impl ProcessedResult {
    /// Fails when the path is empty or the rewritten content is blank
    pub fn new(path: impl Into<PathBuf>, original: impl Into<String>, processed: impl Into<String>) -> Result<Self> {
        let result = Self {
            path: path.into(),
            original: original.into(),
            processed: processed.into(),
        };
        result.validate()?;
        Ok(result)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(PipelineError::Validation("processed result has no file path".to_string()));
        }
        if self.processed.trim().is_empty() {
            return Err(PipelineError::Validation(format!(
                "processed content for {} is empty",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn processed(&self) -> &str {
        &self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction() -> Arc<Instruction> {
        Arc::new(Instruction::new("t", "Add comments", "Keep behaviour"))
    }

    #[test]
    fn test_inference_task_valid() {
        let task = InferenceTask::new("f.py", "print(1)", instruction());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_inference_task_empty_path() {
        let task = InferenceTask::new("", "print(1)", instruction());
        assert!(matches!(task.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_inference_task_incomplete_instruction() {
        let broken = Arc::new(Instruction::new("t", "Add comments", ""));
        let task = InferenceTask::new("f.py", "print(1)", broken);
        assert!(matches!(task.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_processed_result_accessors() {
        let result = ProcessedResult::new("f.py", "print(1)", "print(1)  # ok").unwrap();
        assert_eq!(result.path(), Path::new("f.py"));
        assert_eq!(result.original(), "print(1)");
        assert_eq!(result.processed(), "print(1)  # ok");
    }

    #[test]
    fn test_processed_result_rejects_blank_output() {
        let err = ProcessedResult::new("f.py", "print(1)", "\n  ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_processed_result_rejects_empty_path() {
        assert!(ProcessedResult::new("", "a", "b").is_err());
    }

    #[test]
    fn test_processed_result_allows_empty_original() {
        assert!(ProcessedResult::new("new.py", "", "# header\n").is_ok());
    }
}
