//! Parser for the inline tool-call syntax emitted by the language model.
//!
//! A response may contain any number of `[TOOL:name(key=value, ...)]`
//! occurrences. Parsing is permissive: malformed argument pairs are
//! skipped and unparseable text yields no calls, never an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TOOL_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[TOOL:(\w+)\((.*?)\)\]").unwrap());

/// A scalar argument value coerced from the tool-call syntax.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ArgValue {
    /// Coerce a raw argument string. Surrounding quotes are stripped only
    /// when they form a matching pair; the remainder is tried as integer,
    /// then float, then boolean, and kept as a string otherwise.
    pub fn coerce(raw: &str) -> Self {
        let value = strip_matching_quotes(raw.trim());

        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = value.parse::<i64>() {
                return ArgValue::Int(n);
            }
            // Digit runs too long for i64 still read as numbers
            if let Ok(f) = value.parse::<f64>() {
                return ArgValue::Float(f);
            }
        }

        if is_simple_float(value) {
            if let Ok(f) = value.parse::<f64>() {
                return ArgValue::Float(f);
            }
        }

        if value.eq_ignore_ascii_case("true") {
            return ArgValue::Bool(true);
        }
        if value.eq_ignore_ascii_case("false") {
            return ArgValue::Bool(false);
        }

        ArgValue::Str(value.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Int(n) => Some(*n as f64),
            ArgValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert into a JSON value with the same scalar shape.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgValue::Int(n) => serde_json::Value::from(*n),
            ArgValue::Float(f) => serde_json::Value::from(*f),
            ArgValue::Bool(b) => serde_json::Value::from(*b),
            ArgValue::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(n) => write!(f, "{n}"),
            ArgValue::Float(x) => write!(f, "{x}"),
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Parsed arguments keyed by name. Duplicate keys keep the last occurrence.
pub type ArgMap = HashMap<String, ArgValue>;

/// One tool invocation requested by the model, in order of appearance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: ArgMap,
}

/// Extract every `[TOOL:name(args)]` occurrence from a model response.
///
/// Calls are returned in appearance order. An empty argument list is a
/// valid call; pairs without `=` are dropped silently.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    TOOL_CALL_RE
        .captures_iter(text)
        .map(|caps| ToolCall {
            name: caps[1].to_string(),
            arguments: parse_arguments(&caps[2]),
        })
        .collect()
}

fn parse_arguments(args_str: &str) -> ArgMap {
    let mut arguments = ArgMap::new();
    if args_str.trim().is_empty() {
        return arguments;
    }

    for pair in split_outside_quotes(args_str) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        arguments.insert(key.to_string(), ArgValue::coerce(value));
    }

    arguments
}

/// Split on commas that sit outside single- or double-quoted spans.
fn split_outside_quotes(input: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => in_quote = Some(c),
            None if c == ',' => {
                pieces.push(&input[start..i]);
                start = i + 1;
            }
            None => {}
        }
    }
    pieces.push(&input[start..]);
    pieces
}

fn strip_matching_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn is_simple_float(value: &str) -> bool {
    if !value.contains('.') {
        return false;
    }
    let without_dot = value.replacen('.', "", 1);
    !without_dot.is_empty() && without_dot.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_call_with_mixed_args() {
        let calls = parse_tool_calls("Sure! [TOOL:vibrate(intensity=10, toy=\"left\")]");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "vibrate");
        assert_eq!(calls[0].arguments["intensity"], ArgValue::Int(10));
        assert_eq!(
            calls[0].arguments["toy"],
            ArgValue::Str("left".to_string())
        );
    }

    #[test]
    fn test_empty_argument_list() {
        let calls = parse_tool_calls("[TOOL:get_time()]");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_time");
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_multiple_calls_preserve_order() {
        let text = "First [TOOL:get_time()] then [TOOL:search_notes(query=\"x\", num_results=3)]";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_time");
        assert_eq!(calls[1].name, "search_notes");
        assert_eq!(calls[1].arguments["num_results"], ArgValue::Int(3));
    }

    #[test]
    fn test_coercion_ladder() {
        assert_eq!(ArgValue::coerce("42"), ArgValue::Int(42));
        assert_eq!(ArgValue::coerce("1.5"), ArgValue::Float(1.5));
        assert_eq!(ArgValue::coerce(".5"), ArgValue::Float(0.5));
        assert_eq!(ArgValue::coerce("5."), ArgValue::Float(5.0));
        assert_eq!(ArgValue::coerce("true"), ArgValue::Bool(true));
        assert_eq!(ArgValue::coerce("FALSE"), ArgValue::Bool(false));
        assert_eq!(ArgValue::coerce("hello"), ArgValue::Str("hello".to_string()));
    }

    #[test]
    fn test_quoted_values_still_coerce() {
        assert_eq!(ArgValue::coerce("\"10\""), ArgValue::Int(10));
        assert_eq!(ArgValue::coerce("'true'"), ArgValue::Bool(true));
        assert_eq!(ArgValue::coerce("\"plain\""), ArgValue::Str("plain".to_string()));
    }

    #[test]
    fn test_mismatched_quotes_are_kept() {
        assert_eq!(ArgValue::coerce("\"oops'"), ArgValue::Str("\"oops'".to_string()));
        assert_eq!(ArgValue::coerce("\"dangling"), ArgValue::Str("\"dangling".to_string()));
    }

    #[test]
    fn test_negative_and_versioned_numbers_stay_strings() {
        assert_eq!(ArgValue::coerce("-5"), ArgValue::Str("-5".to_string()));
        assert_eq!(ArgValue::coerce("1.2.3"), ArgValue::Str("1.2.3".to_string()));
    }

    #[test]
    fn test_comma_inside_quotes_does_not_split() {
        let calls = parse_tool_calls("[TOOL:note(text=\"a, b, c\", priority=2)]");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].arguments["text"],
            ArgValue::Str("a, b, c".to_string())
        );
        assert_eq!(calls[0].arguments["priority"], ArgValue::Int(2));
    }

    #[test]
    fn test_malformed_pairs_skipped() {
        let calls = parse_tool_calls("[TOOL:thing(valid=1, nonsense, also_valid=2)]");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments.len(), 2);
        assert_eq!(calls[0].arguments["valid"], ArgValue::Int(1));
        assert_eq!(calls[0].arguments["also_valid"], ArgValue::Int(2));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let calls = parse_tool_calls("[TOOL:thing(a=1, a=2)]");
        assert_eq!(calls[0].arguments["a"], ArgValue::Int(2));
    }

    #[test]
    fn test_value_containing_equals_splits_once() {
        let calls = parse_tool_calls("[TOOL:calc(expr=\"1+1=2\")]");
        assert_eq!(
            calls[0].arguments["expr"],
            ArgValue::Str("1+1=2".to_string())
        );
    }

    #[test]
    fn test_no_calls_in_plain_text() {
        assert!(parse_tool_calls("Just a normal response.").is_empty());
        assert!(parse_tool_calls("").is_empty());
        assert!(parse_tool_calls("[TOOL:broken(no closing").is_empty());
    }

    #[test]
    fn test_call_does_not_span_lines() {
        // The argument span stays within one line, matching the lazy
        // single-line match of the syntax.
        let calls = parse_tool_calls("[TOOL:a(x=1)]\n[TOOL:b(y=2)]");
        assert_eq!(calls.len(), 2);
        let none = parse_tool_calls("[TOOL:a(x=1\n)]");
        assert!(none.is_empty());
    }

    #[test]
    fn test_trailing_comma_ignored() {
        let calls = parse_tool_calls("[TOOL:thing(a=1,)]");
        assert_eq!(calls[0].arguments.len(), 1);
    }

    #[test]
    fn test_json_scalar_shapes() {
        assert_eq!(ArgValue::Int(3).to_json(), serde_json::json!(3));
        assert_eq!(ArgValue::Bool(true).to_json(), serde_json::json!(true));
        assert_eq!(
            ArgValue::Str("s".to_string()).to_json(),
            serde_json::json!("s")
        );
    }
}
