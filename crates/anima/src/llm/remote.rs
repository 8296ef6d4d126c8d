//! HTTP language model client.
//!
//! Speaks a chat-style wire format and tolerates several response body
//! shapes (`response`, OpenAI-style `choices`, bare `content`), so local
//! inference servers and hosted APIs both work unmodified.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::{AnimaError, Result};
use crate::llm::LanguageModel;

#[derive(Debug)]
pub struct HttpLanguageModel {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

impl HttpLanguageModel {
    /// Build a client from configuration. The API key is read from the
    /// environment variable named in the config; when unset, requests go
    /// out without an Authorization header.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnimaError::Llm(e.to_string()))?;

        let api_key = env::var(&config.api_key_env).ok();
        info!(
            "HttpLanguageModel initialized with api_url: {}, auth: {}",
            config.api_url,
            if api_key.is_some() { "bearer" } else { "none" }
        );

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        })
    }

    fn extract_text(body: &Value) -> Option<String> {
        if let Some(text) = body.get("response").and_then(Value::as_str) {
            return Some(text.to_string());
        }
        if let Some(text) = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
        {
            return Some(text.to_string());
        }
        if let Some(text) = body.get("content").and_then(Value::as_str) {
            return Some(text.to_string());
        }
        None
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn invoke(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        if self.api_url.is_empty() {
            return Err(AnimaError::Llm("No LLM endpoint configured".to_string()));
        }

        let request = ChatRequest {
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature,
            stream: false,
        };

        debug!("Calling LLM at: {}", self.api_url);
        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AnimaError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnimaError::Llm(format!(
                "LLM API returned {status}: {error_text}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnimaError::Llm(format!("Failed to parse LLM response: {e}")))?;

        Self::extract_text(&body)
            .ok_or_else(|| AnimaError::Llm("No recognizable content in LLM response".to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
