//! Embedding providers for memory storage and recall.

mod local;
mod remote;

pub use local::{LOCAL_EMBEDDING_DIMENSION, LocalEmbedder};
pub use remote::RemoteEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{AnimaError, Result};

/// Text-to-vector provider. Implementations must return vectors of the
/// width reported by `dimensions` for every input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Build the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new()?)),
        "remote" => Ok(Arc::new(RemoteEmbedder::new(config)?)),
        other => Err(AnimaError::Config(format!(
            "Unknown embedding provider '{other}' (expected 'local' or 'remote')"
        ))),
    }
}
