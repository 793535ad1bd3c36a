//! Text-completion clients
//!
//! The summarizer talks to a `CompletionService`. Two HTTP backends are
//! provided: any OpenAI-compatible `/chat/completions` endpoint and a local
//! Ollama server's `/api/generate`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CompletionConfig, CompletionProvider};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the backend to constrain output to a JSON object.
    pub json_output: bool,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError>;
}

/// Build the configured backend.
pub fn build_completion_service(
    config: &CompletionConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn CompletionService>, AppError> {
    let retry = RetryPolicy {
        max_attempts: config.max_retries + 1,
        base_delay: Duration::from_secs(2),
    };
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider {
        CompletionProvider::OpenAi => {
            let key = api_key.ok_or_else(|| {
                AppError::Config(format!(
                    "Completion API key not set (expected {} in the environment or .env)",
                    config.api_key_env
                ))
            })?;
            Ok(Arc::new(
                OpenAiClient::new(&config.base_url, &config.model, key, timeout).with_retry(retry),
            ))
        }
        CompletionProvider::Ollama => Ok(Arc::new(
            OllamaClient::new(&config.base_url, &config.model, timeout).with_retry(retry),
        )),
    }
}

/// Stands in for a backend that could not be built; every call fails with
/// the reason. Lets commands that never summarize run without an API key.
pub struct UnconfiguredCompletion {
    reason: String,
}

impl UnconfiguredCompletion {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompletionService for UnconfiguredCompletion {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, AppError> {
        Err(AppError::Config(self.reason.clone()))
    }
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; each later delay is four times the last.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 4u32.saturating_pow(attempt)
    }
}

/// Outcome of a single HTTP attempt.
enum Attempt {
    Retryable(String),
    Fatal(String),
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> Attempt {
    let message = format!("Completion service returned {}: {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Attempt::Retryable(message)
    } else {
        Attempt::Fatal(message)
    }
}

async fn with_retries<F, Fut>(policy: RetryPolicy, mut call: F) -> Result<String, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, Attempt>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        match call().await {
            Ok(text) => return Ok(text),
            Err(Attempt::Fatal(e)) => return Err(AppError::Completion(e)),
            Err(Attempt::Retryable(e)) => {
                if attempt + 1 < attempts {
                    let delay = policy.delay_for(attempt);
                    log::warn!(
                        "Completion attempt {} failed, retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    Err(AppError::Completion(format!(
        "Completion failed after {} attempts: {}",
        attempts, last_error
    )))
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, model: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, Attempt> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Attempt::Retryable(format!("Failed to call completion service: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Attempt::Fatal(format!("Failed to parse completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Attempt::Fatal("Completion response had no content".to_string()))
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        log::info!(
            "Sending completion request: model={}, prompt_len={}",
            self.model,
            request.user.len() + request.system.len()
        );
        let text = with_retries(self.retry, || self.attempt(request)).await?;
        log::debug!("Completion response received: {} chars", text.len());
        Ok(text)
    }
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_duration: Option<u64>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, Attempt> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.user,
            system: &request.system,
            stream: false,
            format: request.json_output.then_some("json"),
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Attempt::Retryable(format!("Failed to call Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Attempt::Fatal(format!("Failed to parse Ollama response: {}", e)))?;

        log::info!(
            "Ollama response received: {} chars, eval_duration={:?}ms",
            result.response.len(),
            result.eval_duration.map(|d| d / 1_000_000)
        );

        Ok(result.response)
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        log::info!(
            "Sending request to Ollama: model={}, prompt_len={}",
            self.model,
            request.user.len()
        );
        with_retries(self.retry, || self.attempt(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".to_string(),
            user: "usr".to_string(),
            max_tokens: 100,
            temperature: 0.3,
            json_output: true,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_openai_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("{\"summary\":\"x\"}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(
            &format!("{}/v1/", server.uri()),
            "gpt-4o-mini",
            "sk-test".to_string(),
            Duration::from_secs(5),
        );
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "{\"summary\":\"x\"}");
    }

    #[tokio::test]
    async fn test_openai_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("ok")))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "m", "k".to_string(), Duration::from_secs(5))
            .with_retry(fast_retry());
        assert_eq!(client.complete(&request()).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_openai_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "m", "k".to_string(), Duration::from_secs(5))
            .with_retry(fast_retry());
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::Completion(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&server.uri(), "m", "k".to_string(), Duration::from_secs(5))
            .with_retry(fast_retry());
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::Completion(msg) if msg.contains("after 3 attempts")));
    }

    #[tokio::test]
    async fn test_ollama_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "{\"summary\":\"y\"}",
                "done": true,
                "eval_duration": 2_000_000u64
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&server.uri(), "llama3.2:3b", Duration::from_secs(5));
        assert_eq!(client.complete(&request()).await.unwrap(), "{\"summary\":\"y\"}");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = CompletionConfig::default();
        let err = build_completion_service(&config, None).err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
