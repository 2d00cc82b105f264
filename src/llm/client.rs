//! LLM client trait and a scripted test double

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Stateless LLM client - each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request, one attempt, bounded by the request timeout
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

/// Scripted client for tests
///
/// Queued replies are served first, in order. Once the queue is empty the
/// responder (if any) computes a reply from the request; otherwise the call
/// fails with a malformed-response error.
#[derive(Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String>>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Client that derives every reply from the request
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Default::default()
        }
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for MockLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmClient")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .replies
            .lock()
            .map_err(|e| PipelineError::Network(e.to_string()))?
            .pop_front();

        let reply = match queued {
            Some(reply) => reply,
            None => match &self.responder {
                Some(responder) => responder(&request),
                None => Err(PipelineError::MalformedResponse("mock has no scripted reply".to_string())),
            },
        };

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        reply.map(CompletionResponse::text)
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
