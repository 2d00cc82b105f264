//! promptmill - bulk source rewriting through a local LLM, with self-tuning
//!
//! Files flow through a staged, queue-decoupled pipeline: read, rewrite via
//! an OpenAI-compatible endpoint, write back, and score the edit. Low scores
//! can trigger generation of an improved instruction.

pub mod config;
pub mod discover;
pub mod domain;
pub mod error;
pub mod id;
pub mod llm;
pub mod pipeline;
pub mod presenter;
pub mod storage;

pub use error::{ErrorKind, PipelineError, Result};
