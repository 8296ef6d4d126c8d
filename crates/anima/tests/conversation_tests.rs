//! Ordering and retention guarantees of the conversation log.

use std::collections::BTreeMap;
use std::sync::Arc;

use anima::conversation::{ConversationLog, Role, SqliteConversationLog};

fn no_meta() -> BTreeMap<String, String> {
    BTreeMap::new()
}

mod index_assignment {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_appends_never_gap_or_collide() {
        let log = Arc::new(SqliteConversationLog::open_in_memory().unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append("s1", Role::User, &format!("msg {i}"), &no_meta())
                    .await
                    .unwrap()
                    .message_index
            }));
        }

        let mut indices = Vec::new();
        for handle in handles {
            indices.push(handle.await.unwrap());
        }
        indices.sort_unstable();

        // Strictly increasing by 1 from 0, no gaps, no duplicates
        let expected: Vec<i64> = (0..20).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn test_sessions_number_independently() {
        let log = SqliteConversationLog::open_in_memory().unwrap();

        for _ in 0..3 {
            log.append("a", Role::User, "x", &no_meta()).await.unwrap();
        }
        let b = log.append("b", Role::User, "y", &no_meta()).await.unwrap();
        let a = log.append("a", Role::Assistant, "z", &no_meta()).await.unwrap();

        assert_eq!(b.message_index, 0);
        assert_eq!(a.message_index, 3);
    }

    #[tokio::test]
    async fn test_history_is_ordered_by_index() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..6 {
            log.append("s1", Role::User, &format!("msg {i}"), &no_meta())
                .await
                .unwrap();
        }

        let history = log.history("s1").await.unwrap();
        let indices: Vec<i64> = history.iter().map(|t| t.message_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }
}

mod retention {
    use super::*;

    async fn log_with_turns(n: usize) -> SqliteConversationLog {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        for i in 0..n {
            log.append("s1", Role::User, &format!("msg {i}"), &no_meta())
                .await
                .unwrap();
        }
        log
    }

    #[tokio::test]
    async fn test_prune_leaves_exactly_min_of_keep_and_prior() {
        for (prior, keep, expected) in [(10, 4, 4), (10, 10, 10), (3, 50, 3), (5, 0, 0)] {
            let log = log_with_turns(prior).await;
            log.prune("s1", keep).await.unwrap();
            assert_eq!(
                log.count("s1").await.unwrap(),
                expected,
                "prior={prior} keep={keep}"
            );
        }
    }

    #[tokio::test]
    async fn test_prune_keeps_the_most_recent_turns() {
        let log = log_with_turns(10).await;
        log.prune("s1", 3).await.unwrap();

        let remaining = log.history("s1").await.unwrap();
        let contents: Vec<&str> = remaining.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 7", "msg 8", "msg 9"]);
    }

    #[tokio::test]
    async fn test_prune_only_touches_the_named_session() {
        let log = log_with_turns(6).await;
        log.append("other", Role::User, "hi", &no_meta()).await.unwrap();

        log.prune("s1", 2).await.unwrap();
        assert_eq!(log.count("s1").await.unwrap(), 2);
        assert_eq!(log.count("other").await.unwrap(), 1);
    }
}

mod durability {
    use super::*;

    #[tokio::test]
    async fn test_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.db");

        {
            let log = SqliteConversationLog::open(&path).unwrap();
            log.append("s1", Role::User, "before restart", &no_meta())
                .await
                .unwrap();
            log.append("s1", Role::Assistant, "noted", &no_meta())
                .await
                .unwrap();
        }

        let reopened = SqliteConversationLog::open(&path).unwrap();
        let history = reopened.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "before restart");
        assert_eq!(history[1].role, Role::Assistant);

        // Index assignment continues where it left off
        let next = reopened
            .append("s1", Role::User, "after restart", &no_meta())
            .await
            .unwrap();
        assert_eq!(next.message_index, 2);
    }

    #[tokio::test]
    async fn test_summaries_track_both_ends_of_a_session() {
        let log = SqliteConversationLog::open_in_memory().unwrap();
        log.append("s1", Role::User, "first", &no_meta()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        log.append("s1", Role::Assistant, "last", &no_meta()).await.unwrap();

        let summary = log.session_summary("s1").await.unwrap().unwrap();
        assert_eq!(summary.turn_count, 2);
        assert!(summary.started_at < summary.last_activity);
    }
}
