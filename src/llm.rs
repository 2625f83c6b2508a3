//! Completion-service client.
//!
//! The classifier needs one operation: send a prompt, get raw text back.
//! [`OpenAiCompletionClient`] speaks the OpenAI chat-completions protocol,
//! which vLLM, Ollama and most hosted gateways expose.
//!
//! Requests are not retried. A transport or HTTP failure is returned as an
//! error; a reply without message content is returned as an empty string.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// Something that turns a prompt into raw completion text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompletionClient {
    /// Build a client from `[llm]`. The bearer token is read from the
    /// environment variable named by `api_key_env`, if it is set.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("completion request to {} failed", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("completion service error {}: {}", status, text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("completion service returned a malformed response")?;
        Ok(first_content(parsed))
    }
}

fn first_content(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> String {
        first_content(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_content_extracted() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"status\":\"addressed\"}"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse(raw), r#"{"status":"addressed"}"#);
    }

    #[test]
    fn test_missing_content_is_empty() {
        assert_eq!(parse(r#"{"choices":[]}"#), "");
        assert_eq!(parse(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#), "");
        assert_eq!(parse(r#"{}"#), "");
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "p",
            }],
            temperature: 0.1,
            max_tokens: 16,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 16);
    }

    #[test]
    fn test_endpoint_joined() {
        let config = LlmConfig {
            url: "http://llm:8000/v1/".to_string(),
            ..Default::default()
        };
        let client = OpenAiCompletionClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "http://llm:8000/v1/chat/completions");
    }
}
