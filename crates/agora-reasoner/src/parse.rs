//! LLM response parsing into validated reasoner outputs.
//!
//! The LLM returns raw text (ideally JSON). Extraction tries several
//! recovery strategies before giving up; validation then checks the shape
//! expected by each question and produces the typed answer from
//! `agora-types`. Unrecognized speaker actions degrade to
//! [`SpeakerAction::LeaveAndWander`] instead of failing the turn.

use agora_types::{SpeakerAction, TalkDecision, TurnReply};
use serde_json::Value;
use tracing::debug;

use crate::error::ReasonerError;

/// Extract a JSON object from raw LLM text.
///
/// Attempts multiple recovery strategies if the raw text is not clean JSON:
/// 1. Direct `serde_json` deserialization
/// 2. Extract JSON from markdown code blocks
/// 3. Strip trailing commas and retry
/// 4. Extract from code block then strip commas
/// 5. Take the outermost `{...}` span
pub fn extract_json(raw: &str) -> Result<Value, ReasonerError> {
    let trimmed = raw.trim();

    // Strategy 1: direct parse
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return ensure_object(value);
    }

    // Strategy 2: extract from markdown code block
    if let Some(json_str) = extract_json_from_codeblock(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(json_str)
    {
        return ensure_object(value);
    }

    // Strategy 3: strip trailing commas and retry
    let cleaned = strip_trailing_commas(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return ensure_object(value);
    }

    // Strategy 4: extract from code block then strip commas
    if let Some(json_str) = extract_json_from_codeblock(trimmed) {
        let cleaned_inner = strip_trailing_commas(json_str);
        if let Ok(value) = serde_json::from_str::<Value>(&cleaned_inner) {
            return ensure_object(value);
        }
    }

    // Strategy 5: prose around a single object
    if let Some(span) = outermost_object(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(&strip_trailing_commas(span))
    {
        return ensure_object(value);
    }

    Err(ReasonerError::Parse(format!(
        "all parse strategies failed for: {trimmed}"
    )))
}

/// Validate a talk decision: `{"should_initiate": bool, "reason": string}`.
pub fn parse_decision(raw: &str) -> Result<TalkDecision, ReasonerError> {
    let value = extract_json(raw)?;
    let should_initiate = value
        .get("should_initiate")
        .and_then(as_loose_bool)
        .ok_or_else(|| ReasonerError::Schema("should_initiate must be a boolean".to_owned()))?;
    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned();
    Ok(TalkDecision {
        should_initiate,
        reason,
    })
}

/// Validate a conversation turn: `{"dialogue": string, "action": ...}`.
///
/// `action` may be an object `{"action": "...", "target_name": "..."}` or a
/// bare string. A missing or unknown action, or `leave_and_find` without a
/// target, becomes [`SpeakerAction::LeaveAndWander`].
pub fn parse_turn(raw: &str) -> Result<TurnReply, ReasonerError> {
    let value = extract_json(raw)?;
    let dialogue = required_text(&value, "dialogue")?;
    let action = value
        .get("action")
        .map_or(SpeakerAction::LeaveAndWander, parse_action);
    Ok(TurnReply { dialogue, action })
}

/// Validate a memory summary: `{"memory": string}`.
pub fn parse_summary(raw: &str) -> Result<String, ReasonerError> {
    required_text(&extract_json(raw)?, "memory")
}

/// Validate a private chat reply: `{"response": string}`.
pub fn parse_chat_reply(raw: &str) -> Result<String, ReasonerError> {
    required_text(&extract_json(raw)?, "response")
}

/// Map a raw action value onto the three known actions.
fn parse_action(value: &Value) -> SpeakerAction {
    let (tag, target) = match value {
        Value::String(tag) => (tag.as_str(), None),
        Value::Object(map) => (
            map.get("action").and_then(Value::as_str).unwrap_or_default(),
            map.get("target_name").and_then(Value::as_str),
        ),
        _ => ("", None),
    };

    match normalize_tag(tag).as_str() {
        "continue_talking" | "continue" => SpeakerAction::ContinueTalking,
        "leave_and_find" => match target.map(str::trim) {
            Some(name) if !name.is_empty() => SpeakerAction::LeaveAndFind {
                target_name: name.to_owned(),
            },
            _ => {
                debug!("leave_and_find without target_name, wandering instead");
                SpeakerAction::LeaveAndWander
            }
        },
        "leave_and_wander" => SpeakerAction::LeaveAndWander,
        other => {
            debug!(action = other, "unrecognized speaker action, wandering instead");
            SpeakerAction::LeaveAndWander
        }
    }
}

/// Lowercase and unify separators (`Leave-And-Find` -> `leave_and_find`).
fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Accept `true`/`false` as JSON booleans or as strings.
fn as_loose_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read a non-empty string field.
fn required_text(value: &Value, field: &str) -> Result<String, ReasonerError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| ReasonerError::Schema(format!("{field} must be a non-empty string")))
}

fn ensure_object(value: Value) -> Result<Value, ReasonerError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ReasonerError::Schema("expected a JSON object".to_owned()))
    }
}

/// Extract JSON content from a markdown code block.
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    // Look for ```json ... ``` or ``` ... ```
    let start = text
        .find("```json")
        .map(|i| skip_fence_line(text, i.checked_add(7).unwrap_or(i)))
        .or_else(|| {
            text.find("```")
                .map(|i| skip_fence_line(text, i.checked_add(3).unwrap_or(i)))
        });

    let start = start?;
    let remaining = text.get(start..)?;
    let end = remaining.find("```")?;
    remaining.get(..end).map(str::trim)
}

/// Position just after the newline that ends a fence opener.
fn skip_fence_line(text: &str, after_tag: usize) -> usize {
    text.get(after_tag..)
        .and_then(|s| s.find('\n'))
        .and_then(|nl| after_tag.checked_add(nl))
        .and_then(|pos| pos.checked_add(1))
        .unwrap_or(after_tag)
}

/// The span from the first `{` to the last `}`.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    text.get(start..=end)
}

/// Strip trailing commas before closing braces and brackets (common LLM error).
fn strip_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut i = 0;
    while i < len {
        let c = chars.get(i).copied().unwrap_or(' ');
        if c == ',' {
            // Look ahead past whitespace for } or ]
            let mut j = i.checked_add(1).unwrap_or(i);
            while j < len && chars.get(j).copied().unwrap_or(' ').is_whitespace() {
                j = j.checked_add(1).unwrap_or(j);
            }
            let next = chars.get(j).copied().unwrap_or(' ');
            if next == '}' || next == ']' {
                i = i.checked_add(1).unwrap_or(len);
                continue;
            }
        }
        result.push(c);
        i = i.checked_add(1).unwrap_or(len);
    }

    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_clean_decision() {
        let decision = parse_decision(r#"{"should_initiate": true, "reason": "old friend"}"#).unwrap();
        assert!(decision.should_initiate);
        assert_eq!(decision.reason, "old friend");
    }

    #[test]
    fn parse_decision_from_codeblock() {
        let raw = "Sure!\n```json\n{\"should_initiate\": false, \"reason\": \"busy\",}\n```";
        let decision = parse_decision(raw).unwrap();
        assert!(!decision.should_initiate);
        assert_eq!(decision.reason, "busy");
    }

    #[test]
    fn parse_decision_accepts_string_booleans() {
        let decision = parse_decision(r#"{"should_initiate": "yes"}"#).unwrap();
        assert!(decision.should_initiate);
        assert!(decision.reason.is_empty());
    }

    #[test]
    fn decision_without_flag_is_schema_error() {
        let result = parse_decision(r#"{"reason": "hmm"}"#);
        assert!(matches!(result, Err(ReasonerError::Schema(_))));
    }

    #[test]
    fn garbage_is_parse_error() {
        assert!(matches!(parse_decision("I would rather not."), Err(ReasonerError::Parse(_))));
        assert!(matches!(parse_turn("[1, 2]"), Err(ReasonerError::Schema(_))));
    }

    #[test]
    fn parse_turn_with_find_action() {
        let raw = r#"{"dialogue": "I must go.", "action": {"action": "leave_and_find", "target_name": "Cy"}}"#;
        let turn = parse_turn(raw).unwrap();
        assert_eq!(turn.dialogue, "I must go.");
        assert_eq!(
            turn.action,
            SpeakerAction::LeaveAndFind {
                target_name: "Cy".to_owned()
            }
        );
    }

    #[test]
    fn parse_turn_accepts_bare_string_action() {
        let turn = parse_turn(r#"{"dialogue": "Go on.", "action": "Continue-Talking"}"#).unwrap();
        assert_eq!(turn.action, SpeakerAction::ContinueTalking);
    }

    #[test]
    fn unknown_or_incomplete_actions_wander() {
        let turn = parse_turn(r#"{"dialogue": "Bye.", "action": {"action": "dance"}}"#).unwrap();
        assert_eq!(turn.action, SpeakerAction::LeaveAndWander);

        let turn = parse_turn(r#"{"dialogue": "Bye.", "action": {"action": "leave_and_find"}}"#).unwrap();
        assert_eq!(turn.action, SpeakerAction::LeaveAndWander);

        let turn = parse_turn(r#"{"dialogue": "Bye."}"#).unwrap();
        assert_eq!(turn.action, SpeakerAction::LeaveAndWander);
    }

    #[test]
    fn empty_dialogue_is_schema_error() {
        let result = parse_turn(r#"{"dialogue": "  ", "action": "continue_talking"}"#);
        assert!(matches!(result, Err(ReasonerError::Schema(_))));
    }

    #[test]
    fn parse_summary_and_chat_reply() {
        assert_eq!(parse_summary(r#"{"memory": "Met Bo."}"#).unwrap(), "Met Bo.");
        assert_eq!(
            parse_chat_reply(r#"Here you go: {"response": "Hello!"} Enjoy."#).unwrap(),
            "Hello!"
        );
        assert!(parse_summary(r#"{"memory": ""}"#).is_err());
    }

    #[test]
    fn strip_trailing_commas_basic() {
        assert_eq!(strip_trailing_commas(r#"{"a": 1, "b": 2,}"#), r#"{"a": 1, "b": 2}"#);
        assert_eq!(strip_trailing_commas("[1, 2, 3,]"), "[1, 2, 3]");
    }
}
