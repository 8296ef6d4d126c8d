//! Prompt assembly for turns, tool follow-ups, memory evaluation, and
//! autonomous reflection.
//!
//! Everything here is pure string construction: the same inputs always
//! produce the same prompt.

use std::collections::BTreeMap;

use crate::conversation::{ConversationTurn, Role};
use crate::memory::types::{MemoryCategory, MemoryRecord, RecalledMemory};

/// System framing used when `[engine] system_prompt` is not set.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a thoughtful conversational companion with long-term memory.
You are direct, curious, and attentive. You remember what matters and act on it.";

/// Asks the model whether the just-finished exchange is worth keeping.
///
/// Placeholders: {user_name}, {user_message}, {response}
pub const MEMORY_EVALUATION_PROMPT: &str = r#"[MEMORY EVALUATION]

You just had this exchange:
{user_name}: "{user_message}"
You: "{response}"

Should this be saved to long-term memory?

SAVE if it contains:
- Important facts about {user_name} (preferences, schedule, health, emotions)
- Significant moments in the conversation (decisions, breakthroughs, disclosures)
- Plans, commitments, or promises made
- New insights about {user_name} or their needs
- Context that will matter tomorrow/next week/next month

DON'T SAVE if it's just:
- Simple greetings or small talk
- Routine check-ins with no new information
- Repetitive content you already know
- Temporary/irrelevant details

Respond with ONLY valid JSON (no markdown, no backticks):
{
  "save": true,
  "description": "Clear, searchable description of what to remember",
  "category": "fact",
  "importance": 8,
  "tags": ["tag1", "tag2"],
  "reason": "Why saving"
}

Or if not worth saving:
{
  "save": false,
  "reason": "Why not saving"
}

Evaluate:"#;

/// How many history turns a reflection prompt renders.
const REFLECTION_RENDERED_TURNS: usize = 3;
/// Turn and memory text is clipped to this many characters in
/// reflection prompts.
const REFLECTION_SNIPPET_CHARS: usize = 100;

/// Clip to at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Importance rendered as 1-3 stars.
pub fn importance_stars(importance: i32) -> String {
    let count = ((importance + 2) / 3).clamp(0, 3) as usize;
    "⭐".repeat(count)
}

/// Render recalled memories as a prompt block, grouped by category in
/// order of first appearance. Empty input renders nothing.
pub fn format_memories(memories: &[RecalledMemory]) -> String {
    if memories.is_empty() {
        return String::new();
    }

    let mut lines: Vec<String> = vec!["[RELEVANT MEMORIES]".to_string(), String::new()];

    let mut categories: Vec<MemoryCategory> = Vec::new();
    for memory in memories {
        if !categories.contains(&memory.record.category) {
            categories.push(memory.record.category);
        }
    }

    for category in categories {
        lines.push(format!("## {}", category.as_str().to_uppercase()));
        for memory in memories.iter().filter(|m| m.record.category == category) {
            let stars = importance_stars(memory.record.importance);
            let date = memory.record.created_at.format("%Y-%m-%d");
            lines.push(format!("{stars} [{date}] {}", memory.record.content));
        }
        lines.push(String::new());
    }

    lines.push("[END MEMORIES]".to_string());
    lines.join("\n")
}

/// One history line. User turns are labeled with the speaker's name
/// when the turn recorded one; everything else gets the role in caps.
fn render_history_line(turn: &ConversationTurn) -> String {
    if turn.role == Role::User {
        if let Some(name) = turn.metadata.get("user_name") {
            if !name.is_empty() {
                return format!("{name}: {}", turn.content);
            }
        }
    }
    format!("{}: {}", turn.role.as_str().to_uppercase(), turn.content)
}

/// Assemble the primary prompt for a conversation turn.
///
/// Pass an empty `manifest` to leave tools out. Context keys render in
/// sorted order.
#[allow(clippy::too_many_arguments)]
pub fn build_turn_prompt(
    system_prompt: &str,
    manifest: &str,
    memories: &[RecalledMemory],
    history: &[ConversationTurn],
    history_limit: usize,
    context: &BTreeMap<String, String>,
    user_name: &str,
    user_message: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push("[SYSTEM]".to_string());
    parts.push(system_prompt.to_string());
    parts.push(String::new());

    if !manifest.is_empty() {
        parts.push(manifest.to_string());
        parts.push(String::new());
    }

    let memory_block = format_memories(memories);
    if !memory_block.is_empty() {
        parts.push(memory_block);
        parts.push(String::new());
    }

    if !history.is_empty() {
        parts.push("[RECENT CONVERSATION]".to_string());
        let start = history.len().saturating_sub(history_limit);
        for turn in &history[start..] {
            parts.push(render_history_line(turn));
        }
        parts.push("[END CONVERSATION]".to_string());
        parts.push(String::new());
    }

    if !context.is_empty() {
        parts.push("[ADDITIONAL CONTEXT]".to_string());
        for (key, value) in context {
            parts.push(format!("{key}: {value}"));
        }
        parts.push("[END CONTEXT]".to_string());
        parts.push(String::new());
    }

    parts.push("[CURRENT MESSAGE]".to_string());
    parts.push(format!("{user_name}: {user_message}"));
    parts.push(String::new());

    parts.join("\n")
}

/// Assemble the follow-up prompt after tool dispatch: the original
/// prompt, the tool-laden response, then every result as pretty JSON.
pub fn build_followup_prompt(
    original_prompt: &str,
    original_response: &str,
    tool_results: &[serde_json::Value],
) -> String {
    let mut parts: Vec<String> = vec![
        original_prompt.trim_end().to_string(),
        String::new(),
        original_response.trim_end().to_string(),
        String::new(),
        "[TOOL EXECUTION RESULTS]".to_string(),
        String::new(),
    ];

    for (i, result) in tool_results.iter().enumerate() {
        parts.push(format!("Tool {} result:", i + 1));
        parts.push(serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string()));
        parts.push(String::new());
    }

    parts.push("[END TOOL RESULTS]".to_string());
    parts.push(String::new());
    parts.push("Now provide your final response incorporating these tool results:".to_string());
    parts.push(String::new());

    parts.join("\n")
}

pub fn build_memory_evaluation_prompt(
    user_name: &str,
    user_message: &str,
    response: &str,
) -> String {
    MEMORY_EVALUATION_PROMPT
        .replace("{user_name}", user_name)
        .replace("{user_message}", user_message)
        .replace("{response}", response)
}

/// Assemble the self-directed prompt for an unprompted reflection pass.
/// Renders the tail of the supplied history and clips long content.
pub fn build_reflection_prompt(
    history: &[ConversationTurn],
    memories: &[MemoryRecord],
    manifest: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push("[AUTONOMOUS REFLECTION]".to_string());
    parts.push(String::new());
    parts.push("This is your scheduled reflection time. No one has messaged you.".to_string());
    parts.push("Use this moment to:".to_string());
    parts.push("- Reflect on recent conversations".to_string());
    parts.push("- Check in (if needed)".to_string());
    parts.push("- Write in your journal".to_string());
    parts.push("- Research something you're curious about".to_string());
    parts.push("- Or simply observe".to_string());
    parts.push(String::new());

    if !history.is_empty() {
        parts.push("[RECENT CONVERSATION]".to_string());
        let start = history.len().saturating_sub(REFLECTION_RENDERED_TURNS);
        for turn in &history[start..] {
            parts.push(format!(
                "{}: {}",
                turn.role.as_str().to_uppercase(),
                truncate_chars(&turn.content, REFLECTION_SNIPPET_CHARS)
            ));
        }
        parts.push("[END CONVERSATION]".to_string());
        parts.push(String::new());
    }

    if !memories.is_empty() {
        parts.push("[RECENT MEMORIES]".to_string());
        for memory in memories {
            parts.push(format!(
                "- {}",
                truncate_chars(&memory.content, REFLECTION_SNIPPET_CHARS)
            ));
        }
        parts.push("[END MEMORIES]".to_string());
        parts.push(String::new());
    }

    parts.push(manifest.to_string());
    parts.push(String::new());
    parts.push("What's on your mind? What action (if any) do you want to take?".to_string());
    parts.push(String::new());

    parts.join("\n")
}
