//! Structured output parsing.

use serde::de::DeserializeOwned;

use crate::error::OrcaError;
use crate::types::TurnResult;

/// Parse the JSON object out of a model's final text.
pub fn parse_object(text: &str) -> Result<serde_json::Value, OrcaError> {
    let json_text = strip_code_fences(text);
    let value: serde_json::Value = serde_json::from_str(&json_text)?;
    Ok(value)
}

/// Deserialize a structured-output result into `T`.
///
/// Falls back to parsing the text when the engine did not materialize an object.
pub fn object_from_result<T: DeserializeOwned>(result: &TurnResult) -> Result<T, OrcaError> {
    let value = match &result.object {
        Some(object) => object.clone(),
        None => parse_object(&result.text)?,
    };
    Ok(serde_json::from_value(value)?)
}

/// Strip markdown code fences from JSON response.
pub(crate) fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let without_opening = if let Some(rest) = trimmed.strip_prefix("```json") {
            rest
        } else if let Some(rest) = trimmed.strip_prefix("```") {
            rest
        } else {
            trimmed
        };
        if let Some(stripped) = without_opening.strip_suffix("```") {
            return stripped.trim().to_string();
        }
        return without_opening.trim().to_string();
    }
    trimmed.to_string()
}
