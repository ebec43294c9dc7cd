//! Lenient parsing of JSON lists from model output.

use serde::de::DeserializeOwned;

use crate::core::find_char_boundary;
use crate::error::AgentError;

/// Strips a surrounding markdown code fence, if any.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

/// Parses a JSON array of `T` from model output.
///
/// Accepts a bare array, a fenced array, or an object whose `wrapper_key`
/// (or, failing that, its only array-valued field) holds the array.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] if no array of `T` can be found.
pub fn parse_json_list<T: DeserializeOwned>(
    content: &str,
    wrapper_key: &str,
) -> Result<Vec<T>, AgentError> {
    let json_str = strip_code_fence(content);

    let array_err = match serde_json::from_str::<Vec<T>>(json_str) {
        Ok(items) => return Ok(items),
        Err(e) => e,
    };

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(json_str)
    {
        let arrays: Vec<&serde_json::Value> = map.values().filter(|v| v.is_array()).collect();
        let candidate = map
            .get(wrapper_key)
            .or_else(|| (arrays.len() == 1).then(|| arrays[0]));
        if let Some(value) = candidate
            && let Ok(items) = serde_json::from_value::<Vec<T>>(value.clone())
        {
            return Ok(items);
        }
    }

    let preview = &json_str[..find_char_boundary(json_str, 200)];
    Err(AgentError::ResponseParse {
        message: format!(
            "expected a JSON array: {array_err}. Response length: {} bytes, preview: {preview:?}",
            json_str.len()
        ),
        content: content.to_string(),
    })
}
