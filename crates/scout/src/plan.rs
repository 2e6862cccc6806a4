//! The planner's structured output, recovered permissively from free-form
//! model text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Formatting directive used when the planner gives none
pub const DEFAULT_RESPONSE_FORMAT: &str = "a clear, structured explanation";

/// What to investigate and how to format the answer. Produced once by the
/// planning phase and immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub search_term: String,
    pub response_format: String,
}

impl Plan {
    /// The substitution plan used when the planner's output was not usable.
    /// The pipeline must never fail solely because the planner's free-form
    /// output was not strict JSON.
    pub fn fallback(question: &str) -> Self {
        Plan {
            search_term: question.to_string(),
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
        }
    }

    /// Extract a plan from planner text: take the first top-level `{...}`
    /// substring and read `search_term` and `response_format` from it.
    /// Returns None on malformed JSON, missing or empty fields, or when no
    /// object is present.
    pub fn parse(text: &str) -> Option<Self> {
        let object = first_json_object(text)?;
        let value: Value = serde_json::from_str(object).ok()?;

        let search_term = non_empty_str(&value, "search_term")?;
        let response_format = non_empty_str(&value, "response_format")?;

        Some(Plan {
            search_term,
            response_format,
        })
    }
}

fn non_empty_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// The first balanced top-level `{...}` substring of `text`, brace-matched
/// with awareness of string literals and escapes.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
