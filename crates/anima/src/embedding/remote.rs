//! Remote embedding via an Ollama-compatible HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{AnimaError, Result};

/// Embedding client for `POST <api_url>/api/embeddings`.
#[derive(Debug)]
pub struct RemoteEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnimaError::Embedding(e.to_string()))?;

        info!(
            "RemoteEmbedder initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/api/embeddings",
            self.config.api_url.trim_end_matches('/')
        );
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            prompt: text.to_string(),
        };

        debug!("Requesting embedding from: {}", url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnimaError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnimaError::Embedding(format!(
                "Embedding API returned {status}: {error_text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AnimaError::Embedding(format!("Failed to parse embedding response: {e}")))?;

        if parsed.embedding.is_empty() {
            return Err(AnimaError::Embedding("Empty embedding returned".to_string()));
        }
        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(api_url: String) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "remote".to_string(),
            model: "nomic-embed-text".to_string(),
            api_url,
            dimension: 4,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_embed_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_json(serde_json::json!({
                "model": "nomic-embed-text",
                "prompt": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3, 0.4]
            })))
            .mount(&mock_server)
            .await;

        let embedder = RemoteEmbedder::new(&create_test_config(mock_server.uri())).unwrap();
        let embedding = embedder.embed("hello").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(embedder.dimensions(), 4);
    }

    #[tokio::test]
    async fn test_embed_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&mock_server)
            .await;

        let embedder = RemoteEmbedder::new(&create_test_config(mock_server.uri())).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_embed_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let embedder = RemoteEmbedder::new(&create_test_config(mock_server.uri())).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[tokio::test]
    async fn test_embed_empty_vector_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embedding": []})),
            )
            .mount(&mock_server)
            .await;

        let embedder = RemoteEmbedder::new(&create_test_config(mock_server.uri())).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("Empty embedding"));
    }

    #[tokio::test]
    async fn test_name() {
        let embedder =
            RemoteEmbedder::new(&create_test_config("http://localhost:1".to_string())).unwrap();
        assert_eq!(embedder.name(), "remote");
    }
}
