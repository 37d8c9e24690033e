//! Decoding of generated relationship payloads.
//!
//! A response is decoded strictly first. If that fails, one repair pass
//! strips code-fence markers and a leading `json` label, then decoding is
//! retried. The payload may be a single relationship object or an array of
//! them; records that fail validation are dropped individually.

use log::warn;
use serde_json::Value;

use crate::errors::ParseError;
use crate::models::relationship::Relationship;

const EXCERPT_CHARS: usize = 200;

pub fn parse_relationships(raw: &str) -> Result<Vec<Relationship>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let payload = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let repaired = strip_wrapping(trimmed);
            serde_json::from_str::<Value>(repaired).map_err(|e| ParseError::Malformed {
                reason: e.to_string(),
                excerpt: excerpt(trimmed),
            })?
        }
    };

    normalize(payload, trimmed)
}

/// Removes surrounding backticks and a leading `json` type label.
pub fn strip_wrapping(content: &str) -> &str {
    let inner = content.trim().trim_matches('`').trim();
    match inner.get(..4) {
        Some(label) if label.eq_ignore_ascii_case("json") => inner[4..].trim(),
        _ => inner,
    }
}

fn normalize(payload: Value, raw: &str) -> Result<Vec<Relationship>, ParseError> {
    let items = match payload {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(ParseError::Malformed {
                reason: format!("expected an object or array, got {}", kind_of(&other)),
                excerpt: excerpt(raw),
            })
        }
    };

    let total = items.len();
    let relationships: Vec<Relationship> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let decoded = serde_json::from_value::<Relationship>(item)
                .map_err(|e| e.to_string())
                .and_then(|rel| rel.validate().map(|_| rel));
            match decoded {
                Ok(rel) => Some(rel),
                Err(reason) => {
                    warn!("Dropping relationship record {} of {}: {}", i + 1, total, reason);
                    None
                }
            }
        })
        .collect();

    if relationships.is_empty() && total > 0 {
        return Err(ParseError::NoValidRecords(total));
    }
    Ok(relationships)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn excerpt(raw: &str) -> String {
    let mut out: String = raw.chars().take(EXCERPT_CHARS).collect();
    if raw.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}
