//! Language-model summarizer.
//!
//! Sends a single user message to an OpenAI-compatible chat completions
//! endpoint and returns the reply text. Callers treat every error as
//! "model unavailable" and fall back to deterministic behavior.

use async_trait::async_trait;
use ciboss_core::Config;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("LLM API key not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response contained no message content")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, SummarizerError>;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Free-text reply to `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for `/chat/completions` on any OpenAI-compatible server.
#[derive(Debug, Clone)]
pub struct OpenAiSummarizer {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl OpenAiSummarizer {
    pub fn new(
        api_base: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.llm_api_base,
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            Duration::from_secs(config.http_timeout_sec),
        )
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or(SummarizerError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.api_base);
        debug!(url = %url, model = %self.model, prompt_chars = prompt.len(), "requesting completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(SummarizerError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn summarizer(server: &MockServer, key: Option<&str>) -> OpenAiSummarizer {
        OpenAiSummarizer::new(
            &server.url("/v1"),
            key.map(String::from),
            "gpt-4o",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_includes(r#""model":"gpt-4o""#)
                    .body_includes("Analyze these");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "{\"action\": \"run_tests\"}" } }]
                }));
            })
            .await;

        let reply = summarizer(&server, Some("sk-test"))
            .complete("Analyze these test failures")
            .await
            .unwrap();
        assert_eq!(reply, r#"{"action": "run_tests"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let server = MockServer::start_async().await;
        let err = summarizer(&server, None).complete("hi").await.unwrap_err();
        assert!(matches!(err, SummarizerError::NotConfigured));
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let err = summarizer(&server, Some("sk-test"))
            .complete("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn empty_choices_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let err = summarizer(&server, Some("sk-test"))
            .complete("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizerError::EmptyResponse));
    }
}
