//! Error types for promptmill
//!
//! Centralized error handling using thiserror. Every variant maps onto one of
//! four buckets (see [`ErrorKind`]) so callers can tell a bad task apart from a
//! flaky endpoint without string matching.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Broad classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed fields in a task, instruction, or submission
    Validation,
    /// File read/write or persistence failure
    Io,
    /// Connection failure, timeout, or non-2xx status from the endpoint
    Network,
    /// Response body parsed but lacks the required structure
    Schema,
}

/// All error types that can occur in promptmill
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A task or instruction is missing a required field
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Path missing, not a regular file, or extension not supported
    #[error("Unsupported file: {}", .0.display())]
    UnsupportedFile(PathBuf),

    /// No instruction has been activated
    #[error("No active instruction")]
    NoActiveInstruction,

    /// Work was offered to a stage after it was stopped
    #[error("Stage stopped: {0}")]
    Stopped(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Could not reach the inference endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// Inference endpoint did not answer within the bound
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Inference endpoint answered with a non-success status
    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body was not valid JSON of the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Response carried no choices
    #[error("Response contained no choices")]
    EmptyChoices,

    /// Response parsed but lacks required parts
    #[error("Schema error: {0}")]
    Schema(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_)
            | PipelineError::UnsupportedFile(_)
            | PipelineError::NoActiveInstruction
            | PipelineError::Stopped(_) => ErrorKind::Validation,
            PipelineError::Io(_) | PipelineError::Storage(_) => ErrorKind::Io,
            PipelineError::Network(_) | PipelineError::Timeout(_) | PipelineError::Http { .. } => {
                ErrorKind::Network
            }
            PipelineError::MalformedResponse(_)
            | PipelineError::EmptyChoices
            | PipelineError::Schema(_)
            | PipelineError::Json(_) => ErrorKind::Schema,
        }
    }
}

/// Result type alias for promptmill operations
pub type Result<T> = std::result::Result<T, PipelineError>;
