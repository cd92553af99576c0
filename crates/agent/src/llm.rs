use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use swarmdesk_core::config::LlmConfig;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Client for the Groq OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GroqClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("llm.api_key is required to build the Groq client"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            endpoint: chat_completions_endpoint(&config.base_url),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("chat completion request to `{}` failed", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("failed to read chat completion response body")?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorResponse>(&raw)
                .map(|payload| payload.error.message)
                .unwrap_or(raw);
            return Err(anyhow!("chat completion failed with status {status}: {detail}"));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&raw).context("malformed chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion response contained no choices"))
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        retry_with_backoff(self.max_retries, &self.model, || self.send_once(&request)).await
    }
}

/// Runs `operation` up to `max_retries + 1` times with doubling backoff,
/// starting at 500ms. The last error surfaces once the budget is spent.
async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    model: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Duration::from_millis(500);
    let mut last_error = anyhow!("chat completion was never attempted");

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt < max_retries {
                    warn!(
                        event_name = "llm.request.retry",
                        attempt = attempt + 1,
                        max_retries,
                        model = %model,
                        "chat completion failed, retrying: {error:#}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                last_error = error;
            }
        }
    }

    Err(last_error)
}

fn chat_completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Deterministic stand-in used when test mode is enabled. Never touches the
/// network, so demos and readiness probes work without a credential quota.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineLlm;

pub const OFFLINE_REPLY: &str = "OFFLINE RESPONSE (test mode)";

#[async_trait]
impl LlmClient for OfflineLlm {
    async fn complete(&self, _request: ChatRequest) -> Result<String> {
        Ok(OFFLINE_REPLY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::anyhow;

    use super::{
        chat_completions_endpoint, retry_with_backoff, ApiErrorResponse, ChatMessage, ChatRequest,
        CompletionRequest, CompletionResponse, LlmClient, OfflineLlm, OFFLINE_REPLY,
    };

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        assert_eq!(
            chat_completions_endpoint("https://api.groq.com/openai/v1/"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_endpoint("https://api.groq.com/openai/v1"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn completion_request_serializes_openai_wire_shape() {
        let messages =
            vec![ChatMessage::system("You are Triage."), ChatMessage::user("Classify this.")];
        let body = CompletionRequest {
            model: "llama-3.1-70b-instant",
            messages: &messages,
            temperature: 0.2,
        };

        let json = serde_json::to_value(&body).expect("request should serialize");
        assert_eq!(json["model"], "llama-3.1-70b-instant");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Classify this.");
        let temperature = json["temperature"].as_f64().expect("temperature should be a number");
        assert!((temperature - 0.2).abs() < 1e-6);
    }

    #[test]
    fn completion_response_parses_first_choice() {
        let raw = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "Category: billing. Urgency: high."}}
            ]
        }"#;

        let parsed: CompletionResponse = serde_json::from_str(raw).expect("response should parse");
        assert_eq!(parsed.choices[0].message.content, "Category: billing. Urgency: high.");
    }

    #[test]
    fn api_error_body_parses_nested_message() {
        let raw = r#"{"error": {"message": "Invalid API Key", "type": "invalid_request_error"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(raw).expect("error should parse");
        assert_eq!(parsed.error.message, "Invalid API Key");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_failures() {
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(2, "test-model", || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(anyhow!("transient failure on attempt {attempt}"))
                } else {
                    Ok(format!("recovered on attempt {attempt}"))
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), "recovered on attempt 3");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_surfaces_last_error_once_budget_is_spent() {
        let attempts = AtomicU32::new(0);

        let result: anyhow::Result<String> = retry_with_backoff(2, "test-model", || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(anyhow!("persistent failure on attempt {attempt}")) }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3, "one initial attempt plus two retries");
        let error = result.expect_err("exhausted budget must fail");
        assert_eq!(error.to_string(), "persistent failure on attempt 3");
    }

    #[tokio::test]
    async fn offline_stub_is_deterministic() {
        let stub = OfflineLlm;
        let request = ChatRequest { messages: vec![ChatMessage::user("anything")] };
        let first = stub.complete(request.clone()).await.expect("stub never fails");
        let second = stub.complete(request).await.expect("stub never fails");
        assert_eq!(first, OFFLINE_REPLY);
        assert_eq!(first, second);
    }
}
