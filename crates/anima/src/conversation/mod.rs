//! Conversation history: ordered turns grouped by session.

pub mod sqlite;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use sqlite::SqliteConversationLog;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Parse a stored role string. Unknown values read as `User`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a session. Indexes within a session start at 0 and
/// increase by exactly 1 with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub message_index: i64,
    pub role: Role,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-session rollup for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Append-only turn storage.
///
/// Implementations must assign `message_index` atomically so that two
/// concurrent appends to one session never collide or leave a gap.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Record a turn at the next index for the session.
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ConversationTurn>;

    /// The latest `limit` turns, oldest first.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Every turn in the session, oldest first.
    async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>>;

    async fn count(&self, session_id: &str) -> Result<usize>;

    /// Drop all but the latest `keep_latest` turns. Returns how many
    /// were deleted. A session at or under the limit is untouched.
    async fn prune(&self, session_id: &str, keep_latest: usize) -> Result<usize>;

    /// Remove every turn in the session. Returns how many were deleted;
    /// an unknown session deletes zero and is not an error.
    async fn delete_session(&self, session_id: &str) -> Result<usize>;

    /// All sessions, most recently active first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    async fn session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>>;
}
