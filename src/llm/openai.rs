//! OpenAI-compatible chat completion client
//!
//! Local inference servers (LM Studio, llama.cpp, vLLM, Ollama's OpenAI shim)
//! expose `POST <base>/chat/completions`. This client speaks that dialect with
//! a single attempt per call and no retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::EndpointConfig;
use crate::error::{PipelineError, Result};
use crate::llm::client::LlmClient;
use crate::llm::types::{ChatCompletionBody, ChatCompletionResponse, CompletionRequest, CompletionResponse};

/// Model label used in logs when the config does not name one
const UNNAMED_MODEL: &str = "local";

/// Longest slice of an error body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Client for an OpenAI-compatible endpoint
pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    model: Option<String>,
    default_timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| PipelineError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: chat_endpoint(&config.base_url),
            model: config.model.clone(),
            default_timeout: config.timeout(),
        })
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the JSON request body
    fn build_request(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        let body = ChatCompletionBody {
            model: self.model.as_deref(),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };
        Ok(serde_json::to_value(&body)?)
    }

    /// Parse a raw response body into a CompletionResponse
    fn parse_response(&self, body: &str) -> Result<CompletionResponse> {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(body).map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or(PipelineError::EmptyChoices)?;

        let content = choice
            .message
            .content
            .ok_or_else(|| PipelineError::MalformedResponse("choices[0].message.content is missing".to_string()))?;

        Ok(CompletionResponse {
            content,
            finish_reason: choice.finish_reason,
            usage: parsed.usage.unwrap_or_default(),
        })
    }

    /// Send a request and return the raw success body
    async fn send_request(&self, body: serde_json::Value, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Http {
                status: status.as_u16(),
                body: truncate(&error_body, MAX_ERROR_BODY),
            });
        }

        response.text().await.map_err(|e| transport_error(e, timeout))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let body = self.build_request(&request)?;
        log::debug!(
            "POST {} ({} messages, timeout {:?})",
            self.endpoint,
            request.messages.len(),
            timeout
        );
        let raw = self.send_request(body, timeout).await?;
        self.parse_response(&raw)
    }

    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(UNNAMED_MODEL)
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model())
            .finish()
    }
}

/// Append `/chat/completions` unless the base already ends with it
fn chat_endpoint(base_url: &str) -> String {
    if base_url.contains("/chat/completions") {
        base_url.to_string()
    } else {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Timeout(timeout)
    } else {
        PipelineError::Network(e.to_string())
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base_url: &str) -> EndpointConfig {
        EndpointConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    fn simple_request() -> CompletionRequest {
        CompletionRequest::new()
            .with_system_message("Add comments")
            .with_user_message("print(1)")
            .with_temperature(0.3)
            .with_max_tokens(4000)
    }

    #[test]
    fn test_chat_endpoint_resolution() {
        assert_eq!(chat_endpoint("http://localhost:1234/v1"), "http://localhost:1234/v1/chat/completions");
        assert_eq!(chat_endpoint("http://localhost:1234/v1/"), "http://localhost:1234/v1/chat/completions");
        assert_eq!(
            chat_endpoint("http://h/v1/chat/completions"),
            "http://h/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_request_shape() {
        let client = OpenAiCompatClient::new(&config_for("http://localhost:1234/v1")).unwrap();
        let body = client.build_request(&simple_request()).unwrap();

        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "print(1)");
        assert!(body.get("model").is_none());
    }

    #[test]
    fn test_build_request_with_model() {
        let mut config = config_for("http://localhost:1234/v1");
        config.model = Some("qwen2.5-coder".to_string());
        let client = OpenAiCompatClient::new(&config).unwrap();
        let body = client.build_request(&CompletionRequest::new().with_message(Message::user("x"))).unwrap();
        assert_eq!(body["model"], "qwen2.5-coder");
        assert_eq!(client.model(), "qwen2.5-coder");
    }

    #[test]
    fn test_parse_response_text() {
        let client = OpenAiCompatClient::new(&config_for("http://x/v1")).unwrap();
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "print(1)  # ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        })
        .to_string();

        let response = client.parse_response(&body).unwrap();
        assert_eq!(response.content, "print(1)  # ok");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.total(), 15);
    }

    #[test]
    fn test_parse_response_empty_choices() {
        let client = OpenAiCompatClient::new(&config_for("http://x/v1")).unwrap();
        assert!(matches!(
            client.parse_response(r#"{"choices": []}"#),
            Err(PipelineError::EmptyChoices)
        ));
        assert!(matches!(client.parse_response("{}"), Err(PipelineError::EmptyChoices)));
    }

    #[test]
    fn test_parse_response_not_json() {
        let client = OpenAiCompatClient::new(&config_for("http://x/v1")).unwrap();
        assert!(matches!(
            client.parse_response("<html>oops</html>"),
            Err(PipelineError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_response_missing_content() {
        let client = OpenAiCompatClient::new(&config_for("http://x/v1")).unwrap();
        let result = client.parse_response(r#"{"choices": [{"message": {"role": "assistant"}}]}"#);
        assert!(matches!(result, Err(PipelineError::MalformedResponse(_))));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_debug_impl() {
        let client = OpenAiCompatClient::new(&config_for("http://localhost:1234/v1")).unwrap();
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("OpenAiCompatClient"));
        assert!(debug_str.contains("chat/completions"));
    }

    #[tokio::test]
    async fn test_complete_against_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": false, "temperature": 0.3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "rewritten"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&config_for(&format!("{}/v1", server.uri()))).unwrap();
        let response = client.complete(simple_request()).await.unwrap();
        assert_eq!(response.content, "rewritten");
    }

    #[tokio::test]
    async fn test_complete_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&config_for(&server.uri())).unwrap();
        let err = client.complete(simple_request()).await.unwrap_err();
        match err {
            PipelineError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&config_for(&server.uri())).unwrap();
        let err = client.complete(simple_request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&config_for(&server.uri())).unwrap();
        let err = client.complete(simple_request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyChoices));
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&config_for(&server.uri())).unwrap();
        let request = simple_request().with_timeout(Duration::from_millis(50));
        let err = client.complete(request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_complete_connection_refused() {
        // Port 9 (discard) is not expected to have an HTTP listener
        let client = OpenAiCompatClient::new(&config_for("http://127.0.0.1:9/v1")).unwrap();
        let err = client
            .complete(simple_request().with_timeout(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network(_) | PipelineError::Timeout(_)));
    }
}
