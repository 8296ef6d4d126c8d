//! Error types for Anima

use thiserror::Error;

/// Main error type for Anima operations
#[derive(Error, Debug)]
pub enum AnimaError {
    /// Storage-related errors (LanceDB, SQLite, file system, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Language model invocation errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capability registration or dispatch errors
    #[error("Capability error: {0}")]
    Capability(String),

    /// Memory operation errors
    #[error("Memory error: {0}")]
    Memory(String),

    /// Conversation log errors
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// Rejected caller input (empty message, bad identifier)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

/// Result type alias for Anima operations
pub type Result<T> = std::result::Result<T, AnimaError>;
