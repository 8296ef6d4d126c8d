//! Local embedding via fastembed.

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::{AnimaError, Result};

pub const LOCAL_EMBEDDING_DIMENSION: usize = 384;

/// In-process embedding model. Encoding needs `&mut`, so the model sits
/// behind an async mutex and requests serialize.
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
}

impl LocalEmbedder {
    /// Load the model, downloading it on first use.
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(FastEmbedModel::MultilingualE5Small))
            .map_err(|e| AnimaError::Embedding(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.lock().await;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| AnimaError::Embedding(e.to_string()))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AnimaError::Embedding("No embedding returned".to_string()))
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIMENSION
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
