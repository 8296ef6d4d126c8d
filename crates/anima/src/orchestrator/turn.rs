//! Request and outcome types for orchestrated turns.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::capability::{InvocationOutcome, ToolCall};

/// Phases of one processed message, in order:
///
/// Received -> Recalling -> ContextAssembled -> AwaitingPrimaryResponse
/// -> (ParsingTools -> Dispatching -> AwaitingFollowupResponse)
/// -> EvaluatingMemory -> Persisting -> Pruned -> Done
///
/// The parenthesized tool round runs at most once, and only when the
/// response contains tool syntax and tools are enabled for the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    Recalling,
    ContextAssembled,
    AwaitingPrimaryResponse,
    ParsingTools,
    Dispatching,
    AwaitingFollowupResponse,
    EvaluatingMemory,
    Persisting,
    Pruned,
    Done,
}

/// One incoming message plus per-turn switches.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub session_id: String,
    pub user_name: String,
    pub context: BTreeMap<String, String>,
    pub enable_tools: bool,
    pub enable_memory_save: bool,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            user_name: "User".to_string(),
            context: BTreeMap::new(),
            enable_tools: true,
            enable_memory_save: true,
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn without_tools(mut self) -> Self {
        self.enable_tools = false;
        self
    }

    pub fn without_memory_save(mut self) -> Self {
        self.enable_memory_save = false;
        self
    }
}

/// Everything a completed turn reports back.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<InvocationOutcome>,
    pub memory_saved: bool,
    pub memories_recalled: usize,
    pub processing_time_secs: f64,
}

/// Result of an unprompted reflection pass. Reflections can run tools
/// but are never persisted as conversation turns.
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionOutcome {
    pub thought: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<InvocationOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = TurnRequest::new("hi", "s1");
        assert_eq!(request.user_name, "User");
        assert!(request.enable_tools);
        assert!(request.enable_memory_save);
        assert!(request.context.is_empty());
    }

    #[test]
    fn test_request_builders() {
        let request = TurnRequest::new("hi", "s1")
            .with_user_name("Ada")
            .with_context("channel", "cli")
            .without_tools()
            .without_memory_save();

        assert_eq!(request.user_name, "Ada");
        assert_eq!(request.context["channel"], "cli");
        assert!(!request.enable_tools);
        assert!(!request.enable_memory_save);
    }
}
