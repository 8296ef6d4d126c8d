//! SQLite-backed conversation log.
//!
//! One table, one writer lock. Index assignment and the insert happen
//! under the same guard, and a UNIQUE constraint on
//! (session_id, message_index) backs that up at the schema level.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::conversation::{ConversationLog, ConversationTurn, Role, SessionSummary};
use crate::error::{AnimaError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS conversation_turns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        message_index INTEGER NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        timestamp TIMESTAMP NOT NULL,
        UNIQUE(session_id, message_index)
    );
    CREATE INDEX IF NOT EXISTS idx_turns_session
        ON conversation_turns(session_id, message_index DESC);
";

pub struct SqliteConversationLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationLog {
    /// Create or open the log database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            AnimaError::Conversation(format!("Failed to open conversation database: {e}"))
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )
        .map_err(|e| AnimaError::Conversation(format!("Failed to configure SQLite: {e}")))?;

        Self::with_connection(conn)
    }

    /// In-memory log for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AnimaError::Conversation(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AnimaError::Conversation(format!("Failed to create schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnimaError::Conversation("Connection lock poisoned".to_string()))
    }

    fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationTurn> {
        let role: String = row.get(2)?;
        let metadata_json: String = row.get(4)?;
        let metadata: BTreeMap<String, String> =
            serde_json::from_str(&metadata_json).unwrap_or_default();

        Ok(ConversationTurn {
            session_id: row.get(0)?,
            message_index: row.get(1)?,
            role: Role::parse(&role),
            content: row.get(3)?,
            metadata,
            timestamp: row.get(5)?,
        })
    }
}

const TURN_COLUMNS: &str = "session_id, message_index, role, content, metadata, timestamp";

#[async_trait]
impl ConversationLog for SqliteConversationLog {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ConversationTurn> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| AnimaError::Serialization(format!("Failed to encode metadata: {e}")))?;
        let timestamp = Utc::now();

        // Index lookup and insert share one guard so concurrent appends
        // cannot race to the same index
        let conn = self.conn()?;
        let message_index: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(message_index) + 1, 0)
                 FROM conversation_turns WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(|e| AnimaError::Conversation(format!("Failed to assign index: {e}")))?;

        conn.execute(
            "INSERT INTO conversation_turns
                 (session_id, message_index, role, content, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                message_index,
                role.as_str(),
                content,
                metadata_json,
                timestamp
            ],
        )
        .map_err(|e| AnimaError::Conversation(format!("Failed to append turn: {e}")))?;

        debug!("Appended {role} turn {message_index} to session {session_id}");

        Ok(ConversationTurn {
            session_id: session_id.to_string(),
            message_index,
            role,
            content: content.to_string(),
            metadata: metadata.clone(),
            timestamp,
        })
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TURN_COLUMNS} FROM conversation_turns
                 WHERE session_id = ?1
                 ORDER BY message_index DESC LIMIT ?2"
            ))
            .map_err(|e| AnimaError::Conversation(format!("Failed to prepare query: {e}")))?;

        let mut turns = stmt
            .query_map(params![session_id, limit as i64], Self::row_to_turn)
            .map_err(|e| AnimaError::Conversation(format!("Failed to read turns: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AnimaError::Conversation(format!("Failed to read turns: {e}")))?;

        turns.reverse();
        Ok(turns)
    }

    async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TURN_COLUMNS} FROM conversation_turns
                 WHERE session_id = ?1
                 ORDER BY message_index ASC"
            ))
            .map_err(|e| AnimaError::Conversation(format!("Failed to prepare query: {e}")))?;

        stmt.query_map(params![session_id], Self::row_to_turn)
            .map_err(|e| AnimaError::Conversation(format!("Failed to read history: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AnimaError::Conversation(format!("Failed to read history: {e}")))
    }

    async fn count(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM conversation_turns WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(|e| AnimaError::Conversation(format!("Failed to count turns: {e}")))?;
        Ok(count as usize)
    }

    async fn prune(&self, session_id: &str, keep_latest: usize) -> Result<usize> {
        // Indexes are gap-free, so "latest N" is an index threshold
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM conversation_turns
                 WHERE session_id = ?1
                   AND message_index <= (
                       SELECT MAX(message_index) FROM conversation_turns
                       WHERE session_id = ?1
                   ) - ?2",
                params![session_id, keep_latest as i64],
            )
            .map_err(|e| AnimaError::Conversation(format!("Failed to prune session: {e}")))?;

        if deleted > 0 {
            debug!("Pruned {deleted} turns from session {session_id}");
        }
        Ok(deleted)
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM conversation_turns WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(|e| AnimaError::Conversation(format!("Failed to delete session: {e}")))?;

        if deleted > 0 {
            debug!("Deleted session {session_id} ({deleted} turns)");
        }
        Ok(deleted)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, COUNT(*), MIN(timestamp), MAX(timestamp)
                 FROM conversation_turns
                 GROUP BY session_id
                 ORDER BY MAX(timestamp) DESC",
            )
            .map_err(|e| AnimaError::Conversation(format!("Failed to prepare query: {e}")))?;

        stmt.query_map([], |row| {
            Ok(SessionSummary {
                session_id: row.get(0)?,
                turn_count: row.get::<_, i64>(1)? as usize,
                started_at: row.get::<_, DateTime<Utc>>(2)?,
                last_activity: row.get::<_, DateTime<Utc>>(3)?,
            })
        })
        .map_err(|e| AnimaError::Conversation(format!("Failed to list sessions: {e}")))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| AnimaError::Conversation(format!("Failed to list sessions: {e}")))
    }

    async fn session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT session_id, COUNT(*), MIN(timestamp), MAX(timestamp)
             FROM conversation_turns
             WHERE session_id = ?1
             GROUP BY session_id",
            params![session_id],
            |row| {
                Ok(SessionSummary {
                    session_id: row.get(0)?,
                    turn_count: row.get::<_, i64>(1)? as usize,
                    started_at: row.get::<_, DateTime<Utc>>(2)?,
                    last_activity: row.get::<_, DateTime<Utc>>(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| AnimaError::Conversation(format!("Failed to summarize session: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_indexes() {
        let log = SqliteConversationLog::open_in_memory().unwrap();

        let t0 = log.append("s1", Role::User, "hi", &meta(&[])).await.unwrap();
        let t1 = log
            .append("s1", Role::Assistant, "hello", &meta(&[]))
            .await
            .unwrap();
        let other = log.append("s2", Role::User, "hey", &meta(&[])).await.unwrap();

        assert_eq!(t0.message_index, 0);
        assert_eq!(t1.message_index, 1);
        assert_eq!(other.message_index, 0);
    }

    #[tokio::test]
    async fn test_recent_returns_chronological_tail() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..5 {
            log.append("s1", Role::User, &format!("msg {i}"), &meta(&[]))
                .await
                .unwrap();
        }

        let recent = log.recent("s1", 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 2", "msg 3", "msg 4"]);

        let all = log.recent("s1", 100).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].content, "msg 0");
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        let metadata = meta(&[("user_name", "Ada"), ("client", "cli")]);
        log.append("s1", Role::User, "hi", &metadata).await.unwrap();

        let turns = log.history("s1").await.unwrap();
        assert_eq!(turns[0].metadata, metadata);
        assert_eq!(turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_prune_keeps_exactly_latest_n() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..10 {
            log.append("s1", Role::User, &format!("msg {i}"), &meta(&[]))
                .await
                .unwrap();
        }

        let deleted = log.prune("s1", 4).await.unwrap();
        assert_eq!(deleted, 6);
        assert_eq!(log.count("s1").await.unwrap(), 4);

        let remaining = log.history("s1").await.unwrap();
        assert_eq!(remaining[0].content, "msg 6");
        assert_eq!(remaining[3].content, "msg 9");

        // Indexes are preserved, not renumbered
        assert_eq!(remaining[0].message_index, 6);
    }

    #[tokio::test]
    async fn test_prune_under_limit_is_a_noop() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..3 {
            log.append("s1", Role::User, &format!("msg {i}"), &meta(&[]))
                .await
                .unwrap();
        }

        assert_eq!(log.prune("s1", 3).await.unwrap(), 0);
        assert_eq!(log.prune("s1", 50).await.unwrap(), 0);
        assert_eq!(log.prune("empty", 50).await.unwrap(), 0);
        assert_eq!(log.count("s1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_appends_continue_after_prune() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..6 {
            log.append("s1", Role::User, &format!("msg {i}"), &meta(&[]))
                .await
                .unwrap();
        }
        log.prune("s1", 2).await.unwrap();

        let next = log.append("s1", Role::User, "after", &meta(&[])).await.unwrap();
        assert_eq!(next.message_index, 6);
    }

    #[tokio::test]
    async fn test_list_sessions_most_recent_first() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        log.append("old", Role::User, "a", &meta(&[])).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        log.append("new", Role::User, "b", &meta(&[])).await.unwrap();
        log.append("new", Role::Assistant, "c", &meta(&[])).await.unwrap();

        let sessions = log.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "new");
        assert_eq!(sessions[0].turn_count, 2);
        assert_eq!(sessions[1].session_id, "old");
    }

    #[tokio::test]
    async fn test_session_summary_missing_is_none() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        assert!(log.session_summary("nope").await.unwrap().is_none());

        log.append("s1", Role::User, "hi", &meta(&[])).await.unwrap();
        let summary = log.session_summary("s1").await.unwrap().unwrap();
        assert_eq!(summary.turn_count, 1);
        assert_eq!(summary.started_at, summary.last_activity);
    }

    #[tokio::test]
    async fn test_delete_session_removes_only_that_session() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..3 {
            log.append("gone", Role::User, &format!("msg {i}"), &meta(&[]))
                .await
                .unwrap();
        }
        log.append("kept", Role::User, "hi", &meta(&[])).await.unwrap();

        assert_eq!(log.delete_session("gone").await.unwrap(), 3);
        assert_eq!(log.count("gone").await.unwrap(), 0);
        assert_eq!(log.count("kept").await.unwrap(), 1);

        // Unknown or already-deleted sessions delete nothing
        assert_eq!(log.delete_session("gone").await.unwrap(), 0);
        assert_eq!(log.delete_session("never-existed").await.unwrap(), 0);

        // A deleted session starts over at index 0
        let next = log.append("gone", Role::User, "again", &meta(&[])).await.unwrap();
        assert_eq!(next.message_index, 0);
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("turns.db");
        let log = SqliteConversationLog::open(&path).unwrap();
        log.append("s1", Role::User, "hi", &meta(&[])).await.unwrap();
        assert!(path.exists());
    }
}
