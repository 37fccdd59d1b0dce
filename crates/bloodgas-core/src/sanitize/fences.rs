//! Model output unwrapping and JSON parsing.

use serde_json::{Map, Value};

use crate::error::{BloodGasError, BloodGasResult};

const LANGUAGE_TAG: &str = "json";

/// Strip leading ```` ```json ```` / ```` ``` ```` and trailing ```` ``` ```` markup.
/// The language tag is matched case-insensitively.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.get(..LANGUAGE_TAG.len()) {
            Some(tag) if tag.eq_ignore_ascii_case(LANGUAGE_TAG) => &rest[LANGUAGE_TAG.len()..],
            _ => rest,
        };
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse model output into a JSON object.
///
/// Falls back to the outermost `{...}` span when the model wrapped the object
/// in prose. Failures carry a bounded excerpt, never the full payload.
pub fn parse_model_json(raw: &str) -> BloodGasResult<Map<String, Value>> {
    let text = strip_code_fences(raw);

    let parsed = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(first_error) => {
            let span = match (text.find('{'), text.rfind('}')) {
                (Some(start), Some(end)) if end > start => &text[start..=end],
                _ => return Err(BloodGasError::parse(first_error.to_string(), text)),
            };
            serde_json::from_str::<Value>(span)
                .map_err(|e| BloodGasError::parse(e.to_string(), text))?
        }
    };

    match parsed {
        Value::Object(map) => Ok(map),
        _ => Err(BloodGasError::parse("expected a JSON object", text)),
    }
}
