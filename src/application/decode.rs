//! Resilient decoding of structured generator output.
//!
//! Generators are asked for a JSON object but routinely wrap it in code fences, surround it
//! with prose or emit raw newlines inside strings. Decoding tries progressively more
//! forgiving stages and returns the first object that parses.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Direct,
    StrippedFences,
    EmbeddedObject,
    NormalizedWhitespace,
}

impl DecodeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            DecodeStage::Direct => "direct",
            DecodeStage::StrippedFences => "stripped_fences",
            DecodeStage::EmbeddedObject => "embedded_object",
            DecodeStage::NormalizedWhitespace => "normalized_whitespace",
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is empty")]
    Empty,
    #[error("no decode stage produced a JSON object: {last_error}")]
    Unparseable { last_error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub stage: DecodeStage,
}

/// Decode `raw` into a JSON object, trying each stage in order.
pub fn decode_structured(raw: &str) -> Result<Decoded, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Ok(map) = parse_object(trimmed) {
        return Ok(decoded(map, DecodeStage::Direct));
    }

    let stripped = strip_fences(trimmed);
    if let Ok(map) = parse_object(&stripped) {
        return Ok(decoded(map, DecodeStage::StrippedFences));
    }

    if let Some(map) = first_embedded_object(&stripped) {
        return Ok(decoded(map, DecodeStage::EmbeddedObject));
    }

    let normalized = normalize_whitespace(&stripped);
    match parse_object(&normalized) {
        Ok(map) => Ok(decoded(map, DecodeStage::NormalizedWhitespace)),
        Err(last_error) => first_embedded_object(&normalized)
            .map(|map| decoded(map, DecodeStage::NormalizedWhitespace))
            .ok_or(DecodeError::Unparseable { last_error }),
    }
}

fn first_embedded_object(text: &str) -> Option<Map<String, Value>> {
    embedded_objects(text)
        .into_iter()
        .find_map(|candidate| parse_object(candidate).ok())
}

fn decoded(map: Map<String, Value>, stage: DecodeStage) -> Decoded {
    Decoded {
        value: Value::Object(map),
        stage,
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("decoded value is not an object".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

/// Remove ```` ```json ```` openers (any case) and bare ```` ``` ```` markers.
fn strip_fences(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find("```") {
        output.push_str(&rest[..index]);
        rest = &rest[index + 3..];
        if rest
            .get(..4)
            .is_some_and(|marker| marker.eq_ignore_ascii_case("json"))
        {
            rest = &rest[4..];
        }
    }
    output.push_str(rest);
    output.trim().to_string()
}

/// Balanced `{...}` spans in `text`, largest first, found in one pass. Inside a span,
/// string literals and escapes are respected so braces in values do not close it; quotes
/// in the surrounding prose are ignored.
fn embedded_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(index),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push(&text[start..=index]);
                }
            }
            _ => {}
        }
    }

    spans.sort_by(|a, b| b.len().cmp(&a.len()));
    spans.dedup();
    spans
}

/// Replace line breaks and tabs with spaces and collapse runs of whitespace.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
