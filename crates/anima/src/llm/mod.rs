//! Language model invocation.

mod remote;

pub use remote::HttpLanguageModel;

use async_trait::async_trait;

use crate::error::Result;

/// The injected language model dependency.
///
/// One call per prompt; implementations must bound their own latency
/// (the turn pipeline treats a slow endpoint the same as a dead one).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;

    fn name(&self) -> &'static str;
}
