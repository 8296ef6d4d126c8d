//! The conversation orchestrator: one explicit state machine per
//! incoming message.
//!
//! Every remote failure is absorbed into a degraded outcome at its call
//! site. The only fault a caller ever sees from `process_message` is
//! `InvalidInput` for an empty message.

pub mod decision;
pub mod turn;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityRegistry, InvocationOutcome, ToolCall, parse_tool_calls};
use crate::config::{Config, EngineConfig};
use crate::conversation::{ConversationLog, ConversationTurn, Role};
use crate::error::{AnimaError, Result};
use crate::llm::LanguageModel;
use crate::memory::{MemoryEngine, MemoryRecord, RecallParams};
use crate::prompt::{
    build_followup_prompt, build_memory_evaluation_prompt, build_reflection_prompt,
    build_turn_prompt, truncate_chars,
};

pub use decision::{MemoryDecision, parse_memory_decision, strip_code_fences};
pub use turn::{ReflectionOutcome, TurnOutcome, TurnPhase, TurnRequest};

/// Returned in place of a response when the model is unreachable.
pub const NO_RESPONSE_MESSAGE: &str = "Error: No response from LLM";

/// How many turns a reflection fetches from the log.
const REFLECTION_HISTORY_FETCH: usize = 5;
/// How many recent memories a reflection considers.
const REFLECTION_MEMORY_LIMIT: usize = 3;
/// Saved-memory metadata keeps this many characters of each side of
/// the exchange.
const METADATA_SNIPPET_CHARS: usize = 200;

fn enter(phase: TurnPhase) {
    debug!("Turn phase: {phase:?}");
}

pub struct Orchestrator {
    llm: Arc<dyn LanguageModel>,
    memory: Arc<MemoryEngine>,
    log: Arc<dyn ConversationLog>,
    registry: Arc<CapabilityRegistry>,
    engine: EngineConfig,
    keep_latest: usize,
    max_tokens: u32,
    temperature: f32,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        llm: Arc<dyn LanguageModel>,
        memory: Arc<MemoryEngine>,
        log: Arc<dyn ConversationLog>,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            llm,
            memory,
            log,
            registry,
            engine: config.engine.clone(),
            keep_latest: config.conversation.keep_latest,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        }
    }

    /// Run one full turn for an incoming message.
    pub async fn process_message(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let start = Instant::now();

        enter(TurnPhase::Received);
        if request.message.trim().is_empty() {
            return Err(AnimaError::InvalidInput(
                "Message must not be empty".to_string(),
            ));
        }
        info!(
            "Processing message from {} (session: {})",
            request.user_name, request.session_id
        );

        enter(TurnPhase::Recalling);
        let recalled = self
            .memory
            .recall(
                &request.message,
                RecallParams {
                    n_results: self.engine.recall_results,
                    min_importance: self.engine.recall_min_importance,
                    ..RecallParams::default()
                },
            )
            .await;
        if !recalled.is_empty() {
            debug!("Found {} relevant memories", recalled.len());
        }

        let history = self.fetch_history(&request.session_id, self.engine.history_limit).await;

        enter(TurnPhase::ContextAssembled);
        let manifest = if request.enable_tools {
            self.registry.manifest()
        } else {
            String::new()
        };
        let prompt = build_turn_prompt(
            &self.engine.system_prompt,
            &manifest,
            &recalled,
            &history,
            self.engine.history_limit,
            &request.context,
            &request.user_name,
            &request.message,
        );

        enter(TurnPhase::AwaitingPrimaryResponse);
        let Some(mut response) = self.invoke_llm(&prompt).await else {
            // Degraded turn: fixed reply, but the user's message still
            // lands in the log and the turn is still measured
            warn!("LLM unavailable, degrading turn");
            enter(TurnPhase::Persisting);
            self.persist_turn(&request, NO_RESPONSE_MESSAGE).await;
            enter(TurnPhase::Pruned);
            self.prune(&request.session_id).await;
            enter(TurnPhase::Done);
            return Ok(TurnOutcome {
                response: NO_RESPONSE_MESSAGE.to_string(),
                tool_calls: Vec::new(),
                tool_results: Vec::new(),
                memory_saved: false,
                memories_recalled: recalled.len(),
                processing_time_secs: start.elapsed().as_secs_f64(),
            });
        };

        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut tool_results: Vec<InvocationOutcome> = Vec::new();

        if request.enable_tools {
            enter(TurnPhase::ParsingTools);
            tool_calls = parse_tool_calls(&response);

            if !tool_calls.is_empty() {
                enter(TurnPhase::Dispatching);
                info!("Executing {} tool calls", tool_calls.len());
                for call in &tool_calls {
                    let outcome = self.registry.execute(&call.name, &call.arguments).await;
                    if let InvocationOutcome::Error { error } = &outcome {
                        debug!("Tool {} failed: {error}", call.name);
                    }
                    tool_results.push(outcome);
                }

                // Exactly one follow-up round, never recursive
                enter(TurnPhase::AwaitingFollowupResponse);
                let result_values: Vec<Value> =
                    tool_results.iter().map(InvocationOutcome::to_json).collect();
                let followup = build_followup_prompt(&prompt, &response, &result_values);
                response = match self.invoke_llm(&followup).await {
                    Some(followup_response) => followup_response,
                    None => {
                        warn!("Follow-up call failed, degrading response");
                        NO_RESPONSE_MESSAGE.to_string()
                    }
                };
            }
        }

        enter(TurnPhase::EvaluatingMemory);
        let memory_saved = if request.enable_memory_save {
            self.evaluate_and_save(&request, &response).await
        } else {
            false
        };

        enter(TurnPhase::Persisting);
        self.persist_turn(&request, &response).await;

        enter(TurnPhase::Pruned);
        self.prune(&request.session_id).await;

        enter(TurnPhase::Done);
        let processing_time_secs = start.elapsed().as_secs_f64();
        info!("Turn complete ({processing_time_secs:.2}s)");

        Ok(TurnOutcome {
            response,
            tool_calls,
            tool_results,
            memory_saved,
            memories_recalled: recalled.len(),
            processing_time_secs,
        })
    }

    /// Run an unprompted reflection pass: no incoming message, no
    /// memory evaluation, nothing persisted. Tools still dispatch.
    pub async fn reflect(&self, session_id: &str) -> ReflectionOutcome {
        info!("Autonomous reflection (session: {session_id})");

        let history = self.fetch_history(session_id, REFLECTION_HISTORY_FETCH).await;
        let memories: Vec<MemoryRecord> = self.memory.get_recent(REFLECTION_MEMORY_LIMIT).await;
        let manifest = self.registry.manifest();
        let prompt = build_reflection_prompt(&history, &memories, &manifest);

        let Some(thought) = self.invoke_llm(&prompt).await else {
            warn!("LLM unavailable, reflection skipped");
            return ReflectionOutcome {
                thought: String::new(),
                tool_calls: Vec::new(),
                tool_results: Vec::new(),
            };
        };

        let tool_calls = parse_tool_calls(&thought);
        let mut tool_results = Vec::new();
        if !tool_calls.is_empty() {
            info!("Executing {} autonomous actions", tool_calls.len());
            for call in &tool_calls {
                tool_results.push(self.registry.execute(&call.name, &call.arguments).await);
            }
        }

        ReflectionOutcome {
            thought,
            tool_calls,
            tool_results,
        }
    }

    /// Call the model; a failed call or empty response degrades to None.
    async fn invoke_llm(&self, prompt: &str) -> Option<String> {
        match self.llm.invoke(prompt, self.max_tokens, self.temperature).await {
            Ok(response) if !response.is_empty() => Some(response),
            Ok(_) => {
                warn!("LLM returned an empty response");
                None
            }
            Err(e) => {
                warn!("LLM call failed: {e}");
                None
            }
        }
    }

    async fn fetch_history(&self, session_id: &str, limit: usize) -> Vec<ConversationTurn> {
        match self.log.recent(session_id, limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Conversation history unavailable: {e}");
                Vec::new()
            }
        }
    }

    /// Third model call of a turn: ask whether to remember the
    /// exchange, then save if the decision says so.
    async fn evaluate_and_save(&self, request: &TurnRequest, response: &str) -> bool {
        let prompt =
            build_memory_evaluation_prompt(&request.user_name, &request.message, response);

        let Some(eval_response) = self.invoke_llm(&prompt).await else {
            debug!("Memory evaluation unavailable, not saving");
            return false;
        };

        let Some(decision) = parse_memory_decision(&eval_response) else {
            warn!("Could not parse memory decision, not saving");
            return false;
        };

        if !decision.save {
            debug!(
                "Not saving memory: {}",
                decision.reason.as_deref().unwrap_or("no reason given")
            );
            return false;
        }
        if decision.description.is_empty() {
            warn!("Memory decision had no description, not saving");
            return false;
        }

        let mut metadata = Map::new();
        metadata.insert("session_id".to_string(), Value::from(request.session_id.clone()));
        metadata.insert("user_name".to_string(), Value::from(request.user_name.clone()));
        metadata.insert(
            "user_message".to_string(),
            Value::from(truncate_chars(&request.message, METADATA_SNIPPET_CHARS)),
        );
        metadata.insert(
            "response".to_string(),
            Value::from(truncate_chars(response, METADATA_SNIPPET_CHARS)),
        );

        match self
            .memory
            .save(
                &decision.description,
                decision.category,
                decision.importance,
                decision.tags,
                metadata,
            )
            .await
        {
            Ok(record) => {
                info!("Saved memory {} from this exchange", record.id);
                true
            }
            Err(e) => {
                warn!("Memory save failed: {e}");
                false
            }
        }
    }

    /// Append the user turn then the assistant turn. Log failures are
    /// warned about and absorbed.
    async fn persist_turn(&self, request: &TurnRequest, response: &str) {
        let mut user_metadata = BTreeMap::new();
        user_metadata.insert("user_name".to_string(), request.user_name.clone());

        if let Err(e) = self
            .log
            .append(&request.session_id, Role::User, &request.message, &user_metadata)
            .await
        {
            warn!("Failed to persist user turn: {e}");
        }

        if let Err(e) = self
            .log
            .append(&request.session_id, Role::Assistant, response, &BTreeMap::new())
            .await
        {
            warn!("Failed to persist assistant turn: {e}");
        }
    }

    async fn prune(&self, session_id: &str) {
        if let Err(e) = self.log.prune(session_id, self.keep_latest).await {
            warn!("Failed to prune session {session_id}: {e}");
        }
    }
}
