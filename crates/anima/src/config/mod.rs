use serde::Deserialize;
use std::path::PathBuf;

use crate::prompt::DEFAULT_SYSTEM_PROMPT;

/// Main configuration structure for Anima
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Storage configuration (data directory for vectors, logs, journals)
    #[serde(default)]
    pub storage: StorageConfig,
    /// Language model endpoint configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Memory recall configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Conversation log configuration
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// Turn pipeline configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Storage location configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all persistent data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".anima"))
        .unwrap_or_else(|| PathBuf::from(".anima"))
}

/// Language model endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Full chat endpoint URL (e.g., "http://localhost:8080/v1/chat")
    #[serde(default)]
    pub api_url: String,
    /// Environment variable holding the API key (unset = no auth header)
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum tokens per completion
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key_env: default_llm_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
        }
    }
}

fn default_llm_api_key_env() -> String {
    "ANIMA_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_llm_max_tokens() -> u32 {
    4096
}

fn default_llm_temperature() -> f32 {
    0.7
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type: local or remote
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name for the remote provider
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Remote embedding endpoint base URL
    #[serde(default = "default_embedding_api_url")]
    pub api_url: String,
    /// Vector width reported by the remote provider (local is fixed at 384)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Request timeout in seconds for the remote provider
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_url: default_embedding_api_url(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_api_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Memory recall configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Cosine distance cutoff for recall candidates
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    /// Nearest-neighbor overfetch factor (candidates = n_results * multiplier)
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

fn default_max_distance() -> f32 {
    0.7
}

fn default_candidate_multiplier() -> usize {
    2
}

/// Conversation log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// Number of most-recent turns retained per session after each turn
    #[serde(default = "default_keep_latest")]
    pub keep_latest: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            keep_latest: default_keep_latest(),
        }
    }
}

fn default_keep_latest() -> usize {
    50
}

/// Turn pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Fixed framing text at the top of every prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Memories requested per recall pass
    #[serde(default = "default_recall_results")]
    pub recall_results: usize,
    /// Minimum importance for recalled memories
    #[serde(default = "default_recall_min_importance")]
    pub recall_min_importance: i32,
    /// Conversation turns fetched for prompt context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            recall_results: default_recall_results(),
            recall_min_importance: default_recall_min_importance(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_recall_results() -> usize {
    5
}

fn default_recall_min_importance() -> i32 {
    5
}

fn default_history_limit() -> usize {
    10
}
