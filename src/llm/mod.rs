//! LLM Client Layer - OpenAI-compatible chat completions
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction
//! - OpenAiCompatClient implementation for local inference servers
//! - MockLlmClient for tests

pub mod client;
pub mod openai;
pub mod types;

pub use client::{LlmClient, MockLlmClient};
pub use openai::OpenAiCompatClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, Usage};
