//! Test doubles for exercising the engine without real backends.
//!
//! These are deliberately small: a deterministic embedder, an embedder
//! that always fails, and a language model that replays a script.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{AnimaError, Result};
use crate::llm::LanguageModel;

/// Deterministic embedder. The same text always hashes to the same
/// vector, and specific texts can be pinned to chosen vectors so a test
/// can control distances exactly.
pub struct MockEmbedder {
    dimensions: usize,
    pinned: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            pinned: HashMap::new(),
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..self.dimensions)
            .map(|i| {
                let v = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e37_79b9_7f4a_7c15);
                (v as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.pinned.get(text) {
            return Ok(vector.clone());
        }
        Ok(self.hash_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Embedder whose every call fails, for degraded-path tests.
pub struct FailingEmbedder {
    dimensions: usize,
}

impl FailingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AnimaError::Embedding("embedder offline".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Language model that replays queued responses in order and records
/// every prompt it was given. An exhausted script fails the call.
#[derive(Default)]
pub struct ScriptedLanguageModel {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.into()));
        }
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn invoke(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self
            .script
            .lock()
            .map_err(|_| AnimaError::Llm("script lock poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AnimaError::Llm(message)),
            None => Err(AnimaError::Llm("no scripted response left".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("hello").await.unwrap();
        let c = embedder.embed("world").await.unwrap();

        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_mock_embedder_pinned_vector_wins() {
        let embedder = MockEmbedder::new(4).with_vector("query", vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            embedder.embed("query").await.unwrap(),
            vec![1.0, 0.0, 0.0, 0.0]
        );
    }

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedLanguageModel::new();
        model.push_response("first");
        model.push_error("boom");

        assert_eq!(model.invoke("p1", 10, 0.0).await.unwrap(), "first");
        assert!(model.invoke("p2", 10, 0.0).await.is_err());
        assert!(model.invoke("p3", 10, 0.0).await.is_err());
        assert_eq!(model.prompts(), vec!["p1", "p2", "p3"]);
        assert_eq!(model.calls(), 3);
    }
}
