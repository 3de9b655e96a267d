use std::collections::BTreeSet;
use std::str::FromStr;

use quorum_models::{Action, ModelOpinion};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"action": "buy"}`
/// - Markdown-wrapped: ```json\n{"action": "buy"}\n```
/// - Prefix text: `Here is my call:\n{"action": "buy"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                return Some(text[json_start..json_start + end].trim().to_string());
            }
        }
    }

    None
}

/// First balanced `{ ... }`, ignoring braces inside string literals.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Interpret one model's raw answer.
///
/// Tries, in order: a JSON object with an `action` field (and optional
/// `confidence`, number or string); then a single unambiguous action keyword
/// in free text. Anything else is unparseable. Never fails.
pub fn parse_opinion(source_id: &str, raw: &str) -> ModelOpinion {
    if let Some((action, confidence)) = action_from_json(raw) {
        return ModelOpinion::parsed(source_id, raw, action, confidence);
    }

    if let Some(action) = action_from_keywords(raw) {
        debug!(source = %source_id, action = %action, "Opinion parsed from free text");
        return ModelOpinion::parsed(source_id, raw, action, None);
    }

    ModelOpinion::unparseable(source_id, raw)
}

fn action_from_json(raw: &str) -> Option<(Action, Option<Decimal>)> {
    let json_str = extract_json(raw).ok()?;
    let value: serde_json::Value = serde_json::from_str(&json_str).ok()?;
    let action = value
        .get("action")
        .and_then(|a| a.as_str())
        .and_then(|a| Action::from_str(a).ok())?;
    let confidence = value.get("confidence").and_then(decimal_from_json);
    Some((action, confidence))
}

fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

/// The one action named in `text`, or None when zero or several distinct
/// actions appear as whole words.
fn action_from_keywords(text: &str) -> Option<Action> {
    let found: BTreeSet<Action> = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter_map(|word| match word.to_ascii_lowercase().as_str() {
            "buy" => Some(Action::Buy),
            "sell" => Some(Action::Sell),
            "hold" => Some(Action::Hold),
            _ => None,
        })
        .collect();

    match found.len() {
        1 => found.into_iter().next(),
        _ => None,
    }
}
