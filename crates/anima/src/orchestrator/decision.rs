//! Lenient parsing of the model's memory-save decision.
//!
//! Model output is noisy by nature. The decision is extracted field by
//! field with defaults, and anything unparseable reads as "do not
//! save"; this path never fails a turn.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::memory::MemoryCategory;

static FENCE_JSON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```json\n?").unwrap());
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```\n?").unwrap());

/// What the model decided about remembering an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDecision {
    pub save: bool,
    pub description: String,
    pub category: MemoryCategory,
    pub importance: i32,
    pub tags: Vec<String>,
    pub reason: Option<String>,
}

/// Remove markdown code-fence markers the model was told not to emit
/// but emits anyway.
pub fn strip_code_fences(text: &str) -> String {
    let cleaned = FENCE_JSON_RE.replace_all(text.trim(), "");
    let cleaned = FENCE_RE.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Parse a decision out of raw model output. Returns `None` when no
/// JSON object can be extracted; missing fields fall back to defaults.
pub fn parse_memory_decision(response: &str) -> Option<MemoryDecision> {
    let cleaned = strip_code_fences(response);
    let value: Value = serde_json::from_str(&cleaned).ok()?;
    let obj = value.as_object()?;

    let importance = obj
        .get("importance")
        .and_then(Value::as_i64)
        .map(|i| i as i32)
        .or_else(|| {
            obj.get("importance")
                .and_then(Value::as_f64)
                .map(|f| f as i32)
        })
        .unwrap_or(5);

    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(MemoryDecision {
        save: obj.get("save").and_then(Value::as_bool).unwrap_or(false),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        category: MemoryCategory::parse(
            obj.get("category").and_then(Value::as_str).unwrap_or("fact"),
        ),
        importance,
        tags,
        reason: obj
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_save_decision() {
        let decision = parse_memory_decision(
            r#"{
                "save": true,
                "description": "Ada adopted a cat named Miso",
                "category": "fact",
                "importance": 8,
                "tags": ["pets", "ada"],
                "reason": "Lasting personal fact"
            }"#,
        )
        .unwrap();

        assert!(decision.save);
        assert_eq!(decision.description, "Ada adopted a cat named Miso");
        assert_eq!(decision.category, MemoryCategory::Fact);
        assert_eq!(decision.importance, 8);
        assert_eq!(decision.tags, vec!["pets", "ada"]);
        assert_eq!(decision.reason.as_deref(), Some("Lasting personal fact"));
    }

    #[test]
    fn test_parse_dont_save_decision() {
        let decision = parse_memory_decision(r#"{"save": false, "reason": "small talk"}"#).unwrap();
        assert!(!decision.save);
        assert_eq!(decision.description, "");
        assert_eq!(decision.importance, 5);
    }

    #[test]
    fn test_strips_code_fences() {
        let decision = parse_memory_decision(
            "```json\n{\"save\": true, \"description\": \"d\", \"category\": \"plan\", \"importance\": 6}\n```",
        )
        .unwrap();
        assert!(decision.save);
        assert_eq!(decision.category, MemoryCategory::Plan);
    }

    #[test]
    fn test_strips_bare_fences() {
        let decision = parse_memory_decision("```\n{\"save\": true, \"description\": \"d\"}\n```")
            .unwrap();
        assert!(decision.save);
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_memory_decision("I think we should remember this!").is_none());
        assert!(parse_memory_decision("").is_none());
        assert!(parse_memory_decision("[1, 2, 3]").is_none());
        assert!(parse_memory_decision("{\"save\": true").is_none());
    }

    #[test]
    fn test_unknown_category_falls_back_to_fact() {
        let decision =
            parse_memory_decision(r#"{"save": true, "description": "d", "category": "vibe"}"#)
                .unwrap();
        assert_eq!(decision.category, MemoryCategory::Fact);
    }

    #[test]
    fn test_float_importance_is_accepted() {
        let decision =
            parse_memory_decision(r#"{"save": true, "description": "d", "importance": 7.0}"#)
                .unwrap();
        assert_eq!(decision.importance, 7);
    }

    #[test]
    fn test_wrongly_typed_fields_use_defaults() {
        let decision = parse_memory_decision(
            r#"{"save": "yes", "description": 42, "importance": "high", "tags": "solo"}"#,
        )
        .unwrap();
        assert!(!decision.save);
        assert_eq!(decision.description, "");
        assert_eq!(decision.importance, 5);
        assert!(decision.tags.is_empty());
    }

    #[test]
    fn test_non_string_tags_are_skipped() {
        let decision = parse_memory_decision(
            r#"{"save": true, "description": "d", "tags": ["ok", 3, null, "also"]}"#,
        )
        .unwrap();
        assert_eq!(decision.tags, vec!["ok", "also"]);
    }

    #[test]
    fn test_strip_code_fences_passthrough() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
    }
}
